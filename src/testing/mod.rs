//! Shared fixtures for unit tests: a portal with two known accounts and
//! request contexts built without a socket.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::auth::{StaticUserDirectory, UserDirectory, UserRecord};
use crate::config::AppConfig;
use crate::context::{FormData, RequestContext};
use crate::portal::Portal;

pub const TEST_REMOTE: &str = "192.0.2.10:4711";

/// `alice`/`wonderland` (regular) and `root`/`toor` (may become sysadmin).
pub fn test_users() -> Arc<dyn UserDirectory> {
    Arc::new(
        StaticUserDirectory::new()
            .with_user("alice", "wonderland", "Alice Liddell", false)
            .with_user("root", "toor", "Root", true),
    )
}

fn known_user(name: &str) -> UserRecord {
    match name {
        "root" => UserRecord {
            username: "root".to_string(),
            full_name: "Root".to_string(),
            can_be_sysadmin: true,
        },
        other => UserRecord {
            username: other.to_string(),
            full_name: if other == "alice" {
                "Alice Liddell".to_string()
            } else {
                other.to_string()
            },
            can_be_sysadmin: false,
        },
    }
}

pub fn test_portal() -> Arc<Portal> {
    test_portal_with(AppConfig::development())
}

pub fn test_portal_with(config: AppConfig) -> Arc<Portal> {
    Arc::new(
        Portal::builder(config)
            .users(test_users())
            .build()
            .expect("test portal"),
    )
}

pub fn test_context(portal: &Arc<Portal>, method: &str, path: &str) -> RequestContext {
    test_context_with(portal, method, path, &[])
}

pub fn test_context_with(
    portal: &Arc<Portal>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> RequestContext {
    build(portal, method, path, headers, FormData::new())
}

pub fn post_context(portal: &Arc<Portal>, path: &str, form: FormData) -> RequestContext {
    build(portal, "POST", path, &[], form)
}

fn build(portal: &Arc<Portal>, method: &str, path: &str, headers: &[(&str, &str)], form: FormData) -> RequestContext {
    let method = Method::from_bytes(method.as_bytes()).expect("method");
    let uri: Uri = path.parse().expect("uri");

    let mut map = HeaderMap::new();
    for (k, v) in headers {
        map.append(
            HeaderName::from_bytes(k.as_bytes()).expect("header name"),
            HeaderValue::from_str(v).expect("header value"),
        );
    }

    RequestContext::from_parts(Arc::clone(portal), method, &uri, map, TEST_REMOTE, form).expect("context")
}

pub fn login_as(ctx: &mut RequestContext, name: &str) {
    ctx.become_user(known_user(name), false);
}

pub fn login_as_sysadmin(ctx: &mut RequestContext, name: &str) {
    ctx.become_user(known_user(name), true);
}
