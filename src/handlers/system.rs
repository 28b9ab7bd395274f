//! System administration pages.

use futures::future::BoxFuture;
use serde_json::json;

use crate::context::RequestContext;
use crate::form::{pfform, Field, FormStatus, Record};
use crate::menu::{Menu, MenuEntry};
use crate::perms::Perm;

fn h_system_index<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let data = ctx.page_def().with(json!({}));
        ctx.page_show("system/index.tmpl", data);
    })
}

fn iptrk_form() -> Record {
    Record::new("iptrk")
        .field(
            Field::text("ip", "IP Address")
                .hint("The IP address to remove from the table")
                .placeholder("192.0.2.1")
                .required(),
        )
        .field(Field::submit("button", "Remove"))
}

/// List the IP reputation table; a POST removes one address from it.
fn h_iptrk<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let res = if ctx.is_post() {
            ctx.handle_cmd("system iptrk remove", &[String::new()]).await
        } else {
            Ok(String::new())
        };

        let fmt = ctx.portal().config.ui.time_format.clone();
        let entries: Vec<_> = ctx
            .portal()
            .iptrk
            .list()
            .await
            .into_iter()
            .map(|e| {
                json!({
                    "ip": e.ip.to_string(),
                    "count": e.count,
                    "blocked": e.blocked,
                    "entered": e.entered.format(&fmt).to_string(),
                    "last": e.last.format(&fmt).to_string(),
                })
            })
            .collect();

        let form = pfform(ctx, &iptrk_form(), &FormStatus::from_result(&res), true);
        let data = ctx.page_def().with(json!({ "entries": entries, "form": form }));
        ctx.page_show("system/iptrk.tmpl", data);
    })
}

pub fn h_system<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let menu = Menu::new(vec![
            MenuEntry::new("", "", Perm::USER, h_system_index),
            MenuEntry::new("iptrk", "IPtrk", Perm::SYS_ADMIN, h_iptrk),
        ]);
        ctx.ui_menu(menu).await;
    })
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use axum::http::StatusCode;

    use super::*;
    use crate::context::FormData;
    use crate::testing::{login_as, login_as_sysadmin, post_context, test_context, test_portal};

    #[tokio::test]
    async fn test_index() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/system/");
        login_as_sysadmin(&mut ctx, "root");
        ctx.consume_segment();
        h_system(&mut ctx).await;
        assert_eq!(ctx.template_name(), Some("system/index.tmpl"));
    }

    #[tokio::test]
    async fn test_iptrk_requires_sysadmin() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/system/iptrk/");
        login_as(&mut ctx, "alice");
        ctx.consume_segment();
        h_system(&mut ctx).await;
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_iptrk_list_and_remove() {
        let portal = test_portal();
        let ip: IpAddr = "198.51.100.7".parse().unwrap();
        portal.iptrk.count(ip).await;
        portal.iptrk.count(ip).await;

        let mut ctx = test_context(&portal, "GET", "/system/iptrk/");
        login_as_sysadmin(&mut ctx, "root");
        ctx.consume_segment();
        h_system(&mut ctx).await;
        let data = ctx.template_data().unwrap();
        assert_eq!(data["entries"][0]["ip"], "198.51.100.7");
        assert_eq!(data["entries"][0]["count"], 2);
        assert_eq!(data["entries"][0]["blocked"], false);

        let mut seed = test_context(&portal, "GET", "/system/iptrk/");
        login_as_sysadmin(&mut seed, "root");
        let form = FormData::new()
            .with_value("pfCSRF", &seed.csrf_token(""))
            .with_value("ip", "198.51.100.7");
        let mut ctx = post_context(&portal, "/system/iptrk/", form);
        login_as_sysadmin(&mut ctx, "root");
        ctx.consume_segment();
        h_system(&mut ctx).await;

        assert_eq!(portal.iptrk.hits(&ip).await, 0);
        let form = ctx.template_data().unwrap()["form"].as_str().unwrap().to_string();
        assert!(form.contains("IP removed from IPtrk table"));
    }
}
