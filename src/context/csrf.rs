use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{error, info};

use super::RequestContext;
use crate::auth::csrf::{csrf_form_open, csrf_input};
use crate::auth::{CSRF_HEADER, CSRF_TOKEN_NAME};
use crate::form::image::resize_image;
use crate::form::{FormError, ImageSize};

impl RequestContext {
    fn csrf_subject(&self) -> String {
        self.username().unwrap_or_default().to_string()
    }

    /// Check the request's CSRF token once; later calls return the cached
    /// verdict. Every failure counts against the client IP.
    pub async fn check_csrf(&mut self) -> bool {
        if let Some(valid) = self.csrf_checked {
            return valid;
        }

        let subject = self.csrf_subject();
        let from_header = self.header(CSRF_HEADER).to_string();

        let valid = if !from_header.is_empty() {
            self.verify_csrf(&from_header, &subject)
        } else {
            match self.form.get(CSRF_TOKEN_NAME) {
                Some(tok) if !tok.is_empty() => {
                    let tok = tok.to_string();
                    self.verify_csrf(&tok, &subject)
                }
                _ => {
                    error!("Missing expected CSRF token for URL {:?}", self.fullpath);
                    false
                }
            }
        };

        if !valid {
            self.portal.iptrk.count(self.client.ip).await;
        }

        self.csrf_checked = Some(valid);
        valid
    }

    fn verify_csrf(&self, tok: &str, subject: &str) -> bool {
        match self.portal.csrf.check(tok, &self.host, &self.fullpath, subject) {
            Ok(()) => true,
            Err(e) => {
                info!("CSRF token for {:?} rejected: {}", self.fullpath, e);
                false
            }
        }
    }

    /// Query argument that is only returned when the CSRF check passes.
    pub async fn get_arg_csrf(&mut self, key: &str) -> String {
        if !self.check_csrf().await {
            return String::new();
        }
        self.get_arg(key)
    }

    /// POSTed value of `key`, after the CSRF check.
    pub async fn form_value(&mut self, key: &str) -> Result<String, FormError> {
        if !self.is_post() {
            return Err(FormError::NotPost);
        }
        if !self.check_csrf().await {
            return Err(FormError::InvalidCsrf);
        }
        self.form
            .get(key)
            .map(str::to_string)
            .ok_or(FormError::MissingValue)
    }

    /// Every POSTed value of `key`, after the CSRF check.
    pub async fn form_values(&mut self, key: &str) -> Result<Vec<String>, FormError> {
        if !self.is_post() {
            return Err(FormError::NotPost);
        }
        if !self.check_csrf().await {
            return Err(FormError::InvalidCsrf);
        }
        let values: Vec<String> = self.form.get_all(key).into_iter().map(str::to_string).collect();
        if values.is_empty() {
            return Err(FormError::MissingValue);
        }
        Ok(values)
    }

    /// POSTed value without a CSRF check. Only for callers that carry their
    /// own authentication, such as OAuth2 clients.
    pub fn form_value_no_csrf(&self, key: &str) -> Result<String, FormError> {
        if !self.is_post() {
            return Err(FormError::NotPost);
        }
        self.form
            .get(key)
            .map(str::to_string)
            .ok_or(FormError::MissingValue)
    }

    /// An uploaded file, optionally base64 encoded. With `max_image` the
    /// upload must be an image; it is scaled to fit and re-encoded as PNG.
    pub async fn form_file(&mut self, key: &str, max_image: Option<ImageSize>, b64: bool) -> Result<Vec<u8>, FormError> {
        if !self.is_post() {
            return Err(FormError::NotPost);
        }
        if !self.check_csrf().await {
            return Err(FormError::InvalidCsrf);
        }

        let file = self.form.file(key).ok_or(FormError::MissingValue)?;
        let bytes = match max_image {
            Some(max) => resize_image(&file.bytes, max).map_err(|e| {
                info!("Upload {:?} could not be scaled to {}: {}", file.filename, max, e);
                FormError::Upload(format!("File {} is not a usable image", file.filename))
            })?,
            None => file.bytes.clone(),
        };

        Ok(if b64 {
            STANDARD.encode(&bytes).into_bytes()
        } else {
            bytes
        })
    }

    /// A CSRF token for forms posting to `url` (relative to this page).
    pub fn csrf_token(&self, url: &str) -> String {
        let subject = self.csrf_subject();
        match self.portal.csrf.token("post", &self.host, &self.fullpath, url, &subject) {
            Ok(tok) => tok,
            Err(e) => {
                error!("CSRF token generation failed: {}", e);
                String::new()
            }
        }
    }

    pub fn csrf_input(&self, url: &str) -> String {
        csrf_input(&self.csrf_token(url))
    }

    /// Opening form tag plus its CSRF input.
    pub fn csrf_form(&self, url: &str) -> String {
        self.csrf_form_param(url, "")
    }

    pub fn csrf_form_param(&self, url: &str, params: &str) -> String {
        format!("{}{}", csrf_form_open(url, params), self.csrf_input(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FormData;
    use crate::testing::{login_as, post_context, test_context, test_context_with, test_portal};

    #[tokio::test]
    async fn test_valid_token_from_form() {
        let portal = test_portal();
        let probe = test_context(&portal, "GET", "/cli/");
        let tok = probe.csrf_token("");

        let form = FormData::new().with_value("pfCSRF", &tok).with_value("cmd", "help");
        let mut ctx = post_context(&portal, "/cli/", form);
        assert_eq!(ctx.form_value("cmd").await.unwrap(), "help");
        assert_eq!(portal.iptrk.hits(&ctx.client_ip()).await, 0);
    }

    #[tokio::test]
    async fn test_missing_token_counts_once() {
        let portal = test_portal();
        let mut ctx = post_context(&portal, "/cli/", FormData::new().with_value("cmd", "help"));
        assert_eq!(ctx.form_value("cmd").await, Err(FormError::InvalidCsrf));
        assert_eq!(ctx.form_value("cmd").await, Err(FormError::InvalidCsrf));
        assert_eq!(portal.iptrk.hits(&ctx.client_ip()).await, 1);
    }

    #[tokio::test]
    async fn test_token_bound_to_user() {
        let portal = test_portal();
        let anon = test_context(&portal, "GET", "/cli/");
        let tok = anon.csrf_token("");

        let mut ctx = post_context(&portal, "/cli/", FormData::new().with_value("pfCSRF", &tok));
        login_as(&mut ctx, "alice");
        assert!(!ctx.check_csrf().await);
    }

    #[tokio::test]
    async fn test_header_token() {
        let portal = test_portal();
        let tok = test_context(&portal, "GET", "/system/iptrk/").csrf_token("");
        let mut ctx = test_context_with(&portal, "POST", "/system/iptrk/", &[("x-xsrf-token", &tok)]);
        assert!(ctx.check_csrf().await);
    }

    #[tokio::test]
    async fn test_get_is_not_a_post() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/cli/?cmd=help");
        assert_eq!(ctx.form_value("cmd").await, Err(FormError::NotPost));
        assert_eq!(ctx.form_value_no_csrf("cmd"), Err(FormError::NotPost));
        assert_eq!(ctx.get_arg_csrf("cmd").await, "");
    }

    #[tokio::test]
    async fn test_missing_value() {
        let portal = test_portal();
        let tok = test_context(&portal, "GET", "/cli/").csrf_token("");
        let mut ctx = post_context(&portal, "/cli/", FormData::new().with_value("pfCSRF", &tok));
        assert_eq!(ctx.form_value("cmd").await, Err(FormError::MissingValue));
        assert_eq!(ctx.form_value("cmd").await.unwrap_err().to_string(), "Missing value");
    }

    #[tokio::test]
    async fn test_form_file_encoding() {
        let portal = test_portal();
        let tok = test_context(&portal, "GET", "/user/").csrf_token("");
        let form = FormData::new()
            .with_value("pfCSRF", &tok)
            .with_file("avatar", "a.bin", b"abc");
        let mut ctx = post_context(&portal, "/user/", form);

        assert_eq!(ctx.form_file("avatar", None, false).await.unwrap(), b"abc");
        assert_eq!(ctx.form_file("avatar", None, true).await.unwrap(), b"YWJj");
        assert!(matches!(
            ctx.form_file("avatar", Some(ImageSize::new(16, 16)), false).await,
            Err(FormError::Upload(_))
        ));
        assert_eq!(ctx.form_file("other", None, false).await, Err(FormError::MissingValue));
    }

    #[tokio::test]
    async fn test_form_file_scales_images() {
        let portal = test_portal();
        let tok = test_context(&portal, "GET", "/user/").csrf_token("");
        let form = FormData::new()
            .with_value("pfCSRF", &tok)
            .with_file("avatar", "big.png", &crate::form::image::test_png(100, 100));
        let mut ctx = post_context(&portal, "/user/", form);

        let out = ctx.form_file("avatar", Some(ImageSize::new(16, 16)), false).await.unwrap();
        let img = ::image::load_from_memory(&out).unwrap();
        assert!(img.width() <= 16 && img.height() <= 16);
    }

    #[test]
    fn test_csrf_form_markup() {
        let portal = test_portal();
        let ctx = test_context(&portal, "GET", "/system/");
        let html = ctx.csrf_form("iptrk/");
        assert!(html.starts_with("<form method=\"post\" action=\"iptrk/\" >\n"));
        assert!(html.contains("name=\"pfCSRF\""));
    }
}
