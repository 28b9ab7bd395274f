//! UI handlers: the pages and endpoints reachable from the root menu.
//!
//! Menu handlers share the [`HandlerFn`](crate::menu::HandlerFn) shape so
//! they can sit in a [`Menu`](crate::menu::Menu); the error pages are
//! plain async functions called by other handlers and by the resolver.

pub mod api;
pub mod cli;
pub mod error;
pub mod login;
pub mod oauth2;
pub mod root;
pub mod system;
pub mod user;

pub use root::h_root;
