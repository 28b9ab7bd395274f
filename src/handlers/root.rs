//! Entry point of the UI and the main menu.

use axum::http::StatusCode;
use futures::future::BoxFuture;
use serde_json::json;

use super::api::h_api;
use super::cli::h_cli;
use super::login::{h_login, h_logout};
use super::oauth2::h_oauth2;
use super::system::h_system;
use super::user::h_user;
use crate::context::RequestContext;
use crate::menu::{Menu, MenuEntry};
use crate::perms::Perm;

/// First path segments served straight from the static root.
const STATIC_PREFIXES: [&str; 4] = ["favicon.ico", "css", "gfx", "js"];

/// Minutes static files may be cached.
const STATIC_EXPIRES: i64 = 60;

fn h_index<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let data = ctx.page_def().with(json!({}));
        ctx.page_show("index.tmpl", data);
    })
}

fn h_robots<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move { h_static_file(ctx, "robots.txt") })
}

pub fn h_static_file(ctx: &mut RequestContext, file: &str) {
    ctx.set_expires(STATIC_EXPIRES);
    ctx.set_static_file(file);
}

fn h_static(ctx: &mut RequestContext) {
    let file = ctx.raw_path().trim_start_matches('/').to_string();
    h_static_file(ctx, &file);
}

/// The root of the UI tree.
pub fn root_menu() -> Menu {
    Menu::new(vec![
        MenuEntry::new("", "Home", Perm::NONE, h_index),
        MenuEntry::new("robots.txt", "", Perm::NONE | Perm::NOSUBS, h_robots),
        // Shown in the main menu, hidden here
        MenuEntry::new("user", "User", Perm::USER | Perm::HIDDEN, h_user),
        MenuEntry::new("system", "System", Perm::SYS_ADMIN | Perm::HIDDEN, h_system),
        MenuEntry::new("cli", "CLI", Perm::CLI, h_cli),
        MenuEntry::new("api", "", Perm::LOOPBACK | Perm::API, h_api),
        MenuEntry::new("oauth2", "OAuth2", Perm::OAUTH, h_oauth2),
        MenuEntry::new("login", "Login", Perm::NONE | Perm::USER | Perm::NOSUBS, h_login),
        MenuEntry::new(
            "logout",
            "Logout",
            Perm::NONE | Perm::USER | Perm::HIDDEN | Perm::NOSUBS,
            h_logout,
        ),
    ])
}

/// Route one accepted request: static files and `~user` shortcuts first,
/// then the session token, then the menu tree.
pub async fn h_root(ctx: &mut RequestContext) {
    let first = ctx.path().first().cloned().unwrap_or_default();

    if STATIC_PREFIXES.contains(&first.as_str()) {
        h_static(ctx);
        return;
    }

    // https://example.net/~alice/ is /user/alice/
    if let Some(name) = first.strip_prefix('~') {
        if !name.is_empty() {
            let target = format!("/user/{}/", name);
            ctx.set_redirect(&target, StatusCode::FOUND);
            return;
        }
    }

    ctx.init_token().await;
    ctx.ui_menu(root_menu()).await;
}
