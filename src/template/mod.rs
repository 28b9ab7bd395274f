//! Deferred page rendering.
//!
//! Handlers stage a template name plus a JSON page value; the flusher
//! renders it last. `pfform` and `csrf_form` output is produced by the
//! handler and passed in the page value as ready HTML.

mod builtin;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use builtin::TeraTemplates;

use crate::menu::Link;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageUser {
    pub username: String,
    pub full_name: String,
    pub sysadmin: bool,
}

/// Common page data; every template gets at least this.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub page_title: String,
    pub menu: Vec<Link>,
    pub sub_menu: Vec<Link>,
    pub crumbs: Vec<Link>,
    pub css: String,
    pub javascript: String,
    pub sys_name: String,
    pub version: String,
    pub public_url: String,
    pub render_stamp: String,
    pub user: Option<PageUser>,
}

impl Page {
    /// The page as a JSON object with the keys of `extra` merged on top.
    pub fn with(&self, extra: Value) -> Value {
        let mut base = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        if let Value::Object(extra) = extra {
            base.extend(extra);
        }

        Value::Object(base)
    }
}
