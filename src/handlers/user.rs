//! User profile pages.

use std::sync::Arc;

use axum::http::StatusCode;
use futures::future::BoxFuture;
use serde_json::json;
use tracing::error;

use super::error::{h_error, h_no_access};
use crate::auth::UserRecord;
use crate::context::RequestContext;
use crate::form::{pfform, Field, FieldKind, FormStatus, Record};
use crate::menu::{Menu, MenuEntry};
use crate::perms::Perm;

fn profile_form(user: &UserRecord, sysadmin_capable: bool) -> Record {
    Record::new("profile")
        .field(Field::text("username", "Username").value(user.username.as_str()).hint("The name used to log in"))
        .field(Field::text("fullname", "Full Name").value(user.full_name.as_str()))
        .field(
            Field::new("sysadmin", "System Administrator", FieldKind::Bool)
                .value(sysadmin_capable)
                .perms("sysadmin", "nobody"),
        )
}

fn h_user_index<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let Some(name) = ctx.selected_user().map(|u| u.username.clone()) else {
            h_error(ctx, StatusCode::NOT_FOUND).await;
            return;
        };

        let users = Arc::clone(&ctx.portal().users);
        let user = match users.refresh(&name).await {
            Ok(user) => user,
            Err(e) => {
                error!("User index for {}: {}", name, e);
                h_error(ctx, StatusCode::NOT_FOUND).await;
                return;
            }
        };

        let form = pfform(ctx, &profile_form(&user, user.can_be_sysadmin), &FormStatus::default(), false);
        let data = ctx.page_def().with(json!({
            "profile": {
                "username": user.username,
                "full_name": user.full_name,
            },
            "form": form,
        }));
        ctx.page_show("user/index.tmpl", data);
    })
}

/// `/user/<name>/...`: select the user, then descend into their pages.
/// Without a name the caller's own profile is shown.
pub fn h_user<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let name = ctx.path().first().cloned().unwrap_or_default();

        if name.is_empty() {
            match ctx.username().map(str::to_string) {
                Some(me) => ctx.set_redirect(&format!("/user/{}/", me), StatusCode::FOUND),
                None => h_no_access(ctx).await,
            }
            return;
        }

        let user = match ctx.select_user(&name, Perm::USER_SELF | Perm::USER_VIEW).await {
            Ok(user) => user,
            Err(e) => {
                error!("User: {}", e);
                h_no_access(ctx).await;
                return;
            }
        };

        ctx.add_crumb(&name, &user.username, &format!("{} ({})", user.full_name, user.username));
        ctx.consume_segment();

        let menu = Menu::new(vec![MenuEntry::new("", "", Perm::USER | Perm::USER_VIEW, h_user_index)]);
        ctx.ui_menu(menu).await;
    })
}
