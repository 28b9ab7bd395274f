pub mod config;
pub mod ip;
pub mod server;
pub mod token;
