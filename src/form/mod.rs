//! Declarative forms.
//!
//! A [`Record`] describes the fields of an object: label, hint, bounds,
//! visibility, edit permissions and an optional key/value provider. The same
//! description drives both rendering ([`pfform`]) and binding a submission
//! back onto commands ([`RequestContext::handle_form`]).
//!
//! [`RequestContext::handle_form`]: crate::context::RequestContext::handle_form

mod bind;
pub mod html;
pub mod image;
mod perm;
mod render;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::command::CmdError;
use crate::context::RequestContext;

pub use bind::Submission;
pub use image::ImageSize;
pub use perm::field_access;
pub use render::pfform;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Not a POST")]
    NotPost,

    #[error("Invalid CSRF token")]
    InvalidCsrf,

    #[error("Missing value")]
    MissingValue,

    #[error("Only POST supported")]
    OnlyPost,

    #[error("Form expired, please refresh and try again")]
    Expired,

    #[error("Invalid HTML Form submitted")]
    InvalidHtmlForm,

    #[error("No submission button pressed")]
    NoButton,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("{0}")]
    Command(#[from] CmdError),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    Render(String),
}

/// Whether a form is shown for reading or for editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Update,
}

pub type VisibleFn = Arc<dyn Fn(&RequestContext, &str) -> Result<bool, String> + Send + Sync>;
pub type OptionsFn = Arc<dyn Fn(&RequestContext) -> Result<Vec<(String, String)>, String> + Send + Sync>;
pub type TranslateFn = Arc<dyn Fn(&RequestContext, &str) -> String + Send + Sync>;

/// Application permission check for a record: returns `(visible, editable)`.
pub type RecordPermFn = Arc<dyn Fn(&RequestContext, Mode, &Field) -> Result<(bool, bool), String> + Send + Sync>;

/// How a field is presented and bound.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Tel,
    Email,
    Password,
    /// Multi-line text. Plain text fields holding a newline render this way too.
    Textarea,
    Bool,
    Number,
    Range,
    Note,
    WideNote,
    /// Upload; with `max_image` set the file must be an image and is
    /// scaled down to fit.
    File { max_image: Option<ImageSize>, b64: bool },
    Hidden,
    Submit,
    DateTime,
    /// Repeating values with per-item Remove and a trailing Add sub-form.
    Slice { numeric: bool },
    /// Multi-select, or a checkbox group in checkbox mode.
    Map { checkbox: bool },
    Record(Record),
    /// Reflected for nothing; neither rendered nor bound.
    Ignore,
}

impl FieldKind {
    /// Name used by the binder, matching the presentation type.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Tel => "tel",
            FieldKind::Email => "email",
            FieldKind::Password => "password",
            FieldKind::Textarea => "text",
            FieldKind::Bool => "bool",
            FieldKind::Number => "number",
            FieldKind::Range => "range",
            FieldKind::Note => "note",
            FieldKind::WideNote => "widenote",
            FieldKind::File { .. } => "file",
            FieldKind::Hidden => "hidden",
            FieldKind::Submit => "submit",
            FieldKind::DateTime => "datetime",
            FieldKind::Slice { .. } => "slice",
            FieldKind::Map { .. } => "map",
            FieldKind::Record(_) => "struct",
            FieldKind::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Str(String),
    Bool(bool),
    Number(f64),
    Time(NaiveDateTime),
    List(Vec<String>),
    Map(Vec<(String, String)>),
}

impl FieldValue {
    pub fn as_string(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Str(s) => s.clone(),
            FieldValue::Bool(b) => if *b { "yes" } else { "no" }.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Time(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            FieldValue::List(l) => l.join(","),
            FieldValue::Map(m) => m.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(","),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: FieldValue,
    pub hint: String,
    pub placeholder: String,
    /// Numbers: lower bound. Strings: minimum length. `CFG_` names resolve
    /// through the configured form slots.
    pub min: String,
    pub max: String,
    pub class: String,
    pub section: String,
    /// Fallback text for notes without a value.
    pub content: String,
    pub required: bool,
    pub omit_empty: bool,
    /// `false` keeps the field read-only regardless of permissions.
    pub form_edit: bool,
    pub mask: bool,
    /// Permission tags (`"user,sysadmin"`) for reading and for editing.
    pub get_perms: String,
    pub set_perms: String,
    pub skip_fail_perm: bool,
    pub visible: Option<VisibleFn>,
    pub options: Option<OptionsFn>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.label == other.label && self.kind == other.kind && self.value == other.value
    }
}

impl Field {
    pub fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            label: label.to_string(),
            kind,
            value: FieldValue::Empty,
            hint: String::new(),
            placeholder: String::new(),
            min: String::new(),
            max: String::new(),
            class: String::new(),
            section: String::new(),
            content: String::new(),
            required: false,
            omit_empty: false,
            form_edit: true,
            mask: false,
            get_perms: String::new(),
            set_perms: String::new(),
            skip_fail_perm: false,
            visible: None,
            options: None,
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn note(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Note)
    }

    pub fn hidden(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Hidden)
    }

    pub fn submit(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Submit)
    }

    pub fn nested(name: &str, record: Record) -> Self {
        Self::new(name, "", FieldKind::Record(record))
    }

    pub fn value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = value.into();
        self
    }

    pub fn hint(mut self, hint: &str) -> Self {
        self.hint = hint.to_string();
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = placeholder.to_string();
        self
    }

    pub fn min(mut self, min: &str) -> Self {
        self.min = min.to_string();
        self
    }

    pub fn max(mut self, max: &str) -> Self {
        self.max = max.to_string();
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn section(mut self, section: &str) -> Self {
        self.section = section.to_string();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.form_edit = false;
        self
    }

    pub fn masked(mut self) -> Self {
        self.mask = true;
        self
    }

    pub fn perms(mut self, get: &str, set: &str) -> Self {
        self.get_perms = get.to_string();
        self.set_perms = set.to_string();
        self
    }

    pub fn skip_fail_perm(mut self) -> Self {
        self.skip_fail_perm = true;
        self
    }

    pub fn visible_if(mut self, f: VisibleFn) -> Self {
        self.visible = Some(f);
        self
    }

    pub fn options(mut self, f: OptionsFn) -> Self {
        self.options = Some(f);
        self
    }

    /// A fixed key/value list.
    pub fn choices(self, kvs: &[(&str, &str)]) -> Self {
        let kvs: Vec<(String, String)> = kvs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.options(Arc::new(move |_| Ok(kvs.clone())))
    }
}

/// A named group of fields. The name prefixes every rendered element id.
#[derive(Clone, Default)]
pub struct Record {
    pub name: String,
    pub fields: Vec<Field>,
    pub perm_check: Option<RecordPermFn>,
    pub translate: Option<TranslateFn>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl Record {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_perm_check(mut self, f: RecordPermFn) -> Self {
        self.perm_check = Some(f);
        self
    }

    pub fn with_translate(mut self, f: TranslateFn) -> Self {
        self.translate = Some(f);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<FieldValue>) {
        if let Some(f) = self.fields.iter_mut().find(|f| f.name == name) {
            f.value = value.into();
        }
    }
}

/// The `message`/`error` pair shown under a form after a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormStatus {
    pub message: String,
    pub error: String,
}

impl FormStatus {
    pub fn new(message: &str, error: &str) -> Self {
        Self {
            message: message.to_string(),
            error: error.to_string(),
        }
    }

    /// Status from the outcome of a form handler.
    pub fn from_result(res: &Result<String, FormError>) -> Self {
        match res {
            Ok(msg) => Self::new(msg, ""),
            Err(e) => Self::new("", &e.to_string()),
        }
    }
}

/// Canonical truth value of a submitted boolean.
pub fn normalize_bool(val: &str) -> &'static str {
    if is_true(val) {
        "yes"
    } else {
        "no"
    }
}

pub fn is_true(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "on" | "1" | "y" | "t"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_messages() {
        assert_eq!(FormError::NotPost.to_string(), "Not a POST");
        assert_eq!(FormError::InvalidCsrf.to_string(), "Invalid CSRF token");
        assert_eq!(FormError::MissingValue.to_string(), "Missing value");
        assert_eq!(
            FormError::Command(CmdError::UnknownCommand("x".into())).to_string(),
            "Unknown command: x"
        );
    }

    #[test]
    fn test_normalize_bool() {
        assert_eq!(normalize_bool("on"), "yes");
        assert_eq!(normalize_bool("TRUE"), "yes");
        assert_eq!(normalize_bool("off"), "no");
        assert_eq!(normalize_bool(""), "no");
    }

    #[test]
    fn test_field_builder() {
        let rec = Record::new("profile")
            .field(Field::text("FullName", "Full Name").value("Alice").required())
            .field(Field::new("Admin", "Admin", FieldKind::Bool).value(true));
        assert_eq!(rec.get("fullname").unwrap().value.as_string(), "Alice");
        assert!(rec.get("fullname").unwrap().required);
        assert_eq!(rec.get("admin").unwrap().value.as_string(), "yes");
        assert!(rec.get("missing").is_none());
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<String, FormError> = Ok("Updated 1 fields".into());
        assert_eq!(FormStatus::from_result(&ok).message, "Updated 1 fields");
        let err: Result<String, FormError> = Err(FormError::Expired);
        assert_eq!(
            FormStatus::from_result(&err).error,
            "Form expired, please refresh and try again"
        );
    }
}
