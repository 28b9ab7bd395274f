//! Login and logout pages.

use axum::http::StatusCode;
use futures::future::BoxFuture;
use serde_json::json;

use crate::context::RequestContext;
use crate::form::{pfform, Field, FieldKind, FormStatus, Record};

const REQUIRED_NOTE: &str = "Denotes a required field";
const COOKIES_NOTE: &str = "Note: Web cookies are required beyond this point";

fn login_form(comeback: &str) -> Record {
    Record::new("login")
        .field(
            Field::text("username", "Username")
                .hint("Your username")
                .min("CFG_UserMinLen")
                .required()
                .placeholder("CFG_UserExample"),
        )
        .field(
            Field::new("password", "Password", FieldKind::Password)
                .hint("Your password")
                .min("6")
                .required()
                .placeholder("4.very/difficult_p4ssw0rd"),
        )
        .field(
            Field::text("twofactor", "Two Factor Code")
                .hint("Two Factor Token (if configured)")
                .placeholder("314159"),
        )
        .field(Field::hidden("comeback", "Comeback").value(comeback))
        .field(Field::note("required", "Required").required().class("required").value(REQUIRED_NOTE))
        .field(Field::note("cookies", "Cookies").value(COOKIES_NOTE))
        .field(Field::submit("button", "Sign In"))
}

/// Only local absolute paths are followed after a login.
fn safe_comeback(comeback: &str) -> bool {
    comeback.starts_with('/') && !comeback.starts_with("//")
}

/// Where to come back to after logging in from this page; never the
/// login or logout pages themselves.
fn comeback_for(ctx: &RequestContext) -> String {
    let url = ctx.full_url();
    if url == "/" || url.starts_with("/login/") || url.starts_with("/logout/") {
        return String::new();
    }
    url
}

/// Process a login attempt, or show the login form.
pub fn h_login<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        ctx.set_status(StatusCode::UNAUTHORIZED);

        let args = vec![String::new(); 3];
        let res = ctx.handle_cmd("system login", &args).await;

        if let Some(user) = ctx.username().map(str::to_string) {
            let comeback = ctx.form_value("comeback").await.unwrap_or_default();
            let target = if safe_comeback(&comeback) {
                comeback
            } else {
                format!("/user/{}/", user)
            };
            ctx.set_redirect(&target, StatusCode::SEE_OTHER);
            return;
        }

        h_loginui(ctx, &FormStatus::from_result(&res));
    })
}

/// Ask the user to log in again, with `msg` above the form.
pub fn h_relogin(ctx: &mut RequestContext, msg: &str) {
    h_loginui(ctx, &FormStatus::new(msg, ""));
}

pub fn h_loginui(ctx: &mut RequestContext, status: &FormStatus) {
    let form = login_form(&comeback_for(ctx));
    let html = pfform(ctx, &form, status, true);
    let data = ctx.page_def().with(json!({ "form": html }));
    ctx.page_show("misc/login.tmpl", data);
}

pub fn h_logout<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        ctx.logout();
        ctx.set_redirect("/login/", StatusCode::SEE_OTHER);
    })
}
