pub mod access_log;
pub mod app;
pub mod auth;
pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod form;
pub mod handlers;
pub mod iptrk;
pub mod menu;
pub mod net;
pub mod perms;
pub mod portal;
pub mod template;

#[cfg(test)]
pub mod testing;
