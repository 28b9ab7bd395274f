//! Error pages.

use axum::http::StatusCode;
use serde_json::json;
use tracing::error;

use super::login::h_login;
use crate::context::RequestContext;

/// Human readable messages, served with `200 OK`.
pub async fn h_errmsgs(ctx: &mut RequestContext, messages: Vec<String>) {
    ctx.set_page_menu(None);
    let data = ctx.page_def().with(json!({ "messages": messages }));
    ctx.page_show("misc/error.tmpl", data);
}

pub async fn h_errtxt(ctx: &mut RequestContext, text: &str) {
    h_errmsgs(ctx, vec![text.to_string()]).await;
}

/// Error page for `status`. Unauthorized requests get the login page.
pub async fn h_error(ctx: &mut RequestContext, status: StatusCode) {
    ctx.set_status(status);

    if status == StatusCode::UNAUTHORIZED {
        h_login(ctx).await;
        return;
    }

    let mut msg = status.canonical_reason().unwrap_or("Error").to_string();
    let mut code = status.as_u16().to_string();

    if status == StatusCode::SERVICE_UNAVAILABLE {
        msg = "System is under maintenance".to_string();
        code.clear();
    } else {
        ctx.add_crumb("", "HTTP Error", &format!("Error - HTTP {} {}", code, msg));
    }

    ctx.set_page_menu(None);
    let data = ctx.page_def().with(json!({ "messages": [msg.clone()] }));
    ctx.page_show("misc/error.tmpl", data);

    error!("HTTP Error {} {} for {}", code, msg, ctx.fullpath());
}

/// Denied access: pretend the page does not exist for users, ask anonymous
/// callers to log in.
pub async fn h_no_access(ctx: &mut RequestContext) {
    if ctx.is_logged_in() {
        error!("NoAccess: Logged In {:?}", ctx.username());
        h_error(ctx, StatusCode::NOT_FOUND).await;
    } else {
        error!("NoAccess: Not Logged in");
        h_error(ctx, StatusCode::UNAUTHORIZED).await;
    }
}
