//! Parsed POST bodies (urlencoded and multipart).

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request};
use thiserror::Error;

/// Largest urlencoded body that is read into memory.
pub const MAX_FORM_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FormBodyError {
    #[error("Could not read request body: {0}")]
    Body(String),

    #[error("Invalid multipart body: {0}")]
    Multipart(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Submitted form fields in arrival order. File parts are kept apart from
/// the plain values.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    values: Vec<(String, String)>,
    files: Vec<UploadedFile>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_file(mut self, name: &str, filename: &str, bytes: &[u8]) -> Self {
        self.files.push(UploadedFile {
            name: name.to_string(),
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        });
        self
    }

    pub fn from_urlencoded(body: &[u8]) -> Self {
        Self {
            values: url::form_urlencoded::parse(body).into_owned().collect(),
            files: Vec::new(),
        }
    }

    /// First value submitted for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Case-insensitive presence check over values and files.
    pub fn contains(&self, key: &str) -> bool {
        self.values.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
            || self.files.iter().any(|f| f.name.eq_ignore_ascii_case(key))
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.name == key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    /// Read the body of `req` according to its content type.
    pub async fn from_request(req: Request<Body>) -> Result<Self, FormBodyError> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            return Self::from_multipart(req).await;
        }

        let bytes = axum::body::to_bytes(req.into_body(), MAX_FORM_BYTES)
            .await
            .map_err(|e| FormBodyError::Body(e.to_string()))?;

        Ok(Self::from_urlencoded(&bytes))
    }

    async fn from_multipart(req: Request<Body>) -> Result<Self, FormBodyError> {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| FormBodyError::Multipart(e.body_text()))?;

        let mut form = Self::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FormBodyError::Multipart(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| FormBodyError::Multipart(e.body_text()))?;

            match filename {
                Some(filename) => form.files.push(UploadedFile {
                    name,
                    filename,
                    bytes: bytes.to_vec(),
                }),
                None => form
                    .values
                    .push((name, String::from_utf8_lossy(&bytes).into_owned())),
            }
        }

        Ok(form)
    }
}
