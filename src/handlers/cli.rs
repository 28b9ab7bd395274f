//! Command line in the browser.

use futures::future::BoxFuture;
use serde_json::json;

use super::login::h_logout;
use crate::command::split_args;
use crate::context::RequestContext;
use crate::form::{pfform, Field, FormStatus, Record};

fn cli_form(cmd: &str) -> Record {
    Record::new("cli")
        .field(Field::text("cmd", "Command").value(cmd).hint("The command to execute"))
        .field(Field::submit("button", "Execute"))
}

/// Run the POSTed `cmd` (default `help`) and show its output.
pub fn h_cli<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut out = String::new();
        let mut cmd = String::new();
        let mut err: Option<String> = None;

        if ctx.is_post() {
            match ctx.form_value("cmd").await {
                Ok(c) => cmd = c,
                Err(e) => err = Some(e.to_string()),
            }
        }

        if cmd.trim().is_empty() {
            cmd = "help".to_string();
        }

        if err.is_none() {
            let args = split_args(&cmd);
            match ctx.cmd_out("", &args).await {
                Ok(o) => out = o,
                Err(e) => err = Some(e.to_string()),
            }

            // e.g. `system logout`
            if !ctx.is_logged_in() {
                h_logout(ctx).await;
                return;
            }
        }

        if let Some(e) = &err {
            out.push_str(&format!("An error occured: {}\n", e));
        }

        ctx.set_page_menu(None);
        ctx.add_crumb("", "CLI", "Command Line Interface");

        let form = pfform(ctx, &cli_form(&cmd), &FormStatus::default(), true);
        let data = ctx.page_def().with(json!({
            "output": out,
            "error": err.unwrap_or_default(),
            "form": form,
        }));
        ctx.page_show("misc/cli.tmpl", data);
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::context::FormData;
    use crate::testing::{login_as, post_context, test_context, test_portal};

    fn cli_post(portal: &std::sync::Arc<crate::portal::Portal>, cmd: &str) -> RequestContext {
        let mut seed = test_context(portal, "GET", "/cli/");
        login_as(&mut seed, "alice");
        let form = FormData::new()
            .with_value("pfCSRF", &seed.csrf_token(""))
            .with_value("cmd", cmd);
        let mut ctx = post_context(portal, "/cli/", form);
        login_as(&mut ctx, "alice");
        ctx
    }

    #[tokio::test]
    async fn test_get_shows_help() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/cli/");
        login_as(&mut ctx, "alice");
        h_cli(&mut ctx).await;

        assert_eq!(ctx.template_name(), Some("misc/cli.tmpl"));
        let data = ctx.template_data().unwrap();
        assert!(data["output"].as_str().unwrap().starts_with("Portal Help\n"));
        assert_eq!(data["page_title"], "Command Line Interface");
        assert!(data["form"].as_str().unwrap().contains("value=\"help\""));
    }

    #[tokio::test]
    async fn test_post_runs_command() {
        let portal = test_portal();
        let mut ctx = cli_post(&portal, "system whoami");
        h_cli(&mut ctx).await;
        let out = ctx.template_data().unwrap()["output"].as_str().unwrap().to_string();
        assert_eq!(out, "Username: alice\nFullname: Alice Liddell\n");
    }

    #[tokio::test]
    async fn test_unknown_command_is_reported() {
        let portal = test_portal();
        let mut ctx = cli_post(&portal, "frobnicate now");
        h_cli(&mut ctx).await;
        let out = ctx.template_data().unwrap()["output"].as_str().unwrap().to_string();
        assert!(out.starts_with("An error occured: Unknown command: "));
    }

    #[tokio::test]
    async fn test_logout_command_leaves() {
        let portal = test_portal();
        let mut ctx = cli_post(&portal, "system logout");
        h_cli(&mut ctx).await;
        assert!(!ctx.is_logged_in());
        assert_eq!(ctx.status(), StatusCode::SEE_OTHER);
        assert_eq!(ctx.redirect_target(), Some("/login/"));
    }

    #[tokio::test]
    async fn test_missing_csrf_is_refused() {
        let portal = test_portal();
        let mut ctx = post_context(&portal, "/cli/", FormData::new().with_value("cmd", "system whoami"));
        login_as(&mut ctx, "alice");
        h_cli(&mut ctx).await;

        let data = ctx.template_data().unwrap();
        assert_eq!(data["error"], "Invalid CSRF token");
        assert_eq!(data["output"], "An error occured: Invalid CSRF token\n");
        assert_eq!(portal.iptrk.hits(&ctx.client_ip()).await, 1);
    }
}
