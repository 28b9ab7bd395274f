//! OAuth 2.0 authorization server endpoints.
//!
//! Grants are signed tokens: `authorize` hands out a one-minute
//! `oauth_auth` code carrying the request, `token` swaps that code for an
//! `oauth_access` token, and `info` describes a token. Nothing is stored
//! server side apart from the revocation of used codes.

use axum::http::StatusCode;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::json;
use url::Url;

use super::error::{h_error, h_errmsgs};
use super::login::h_login;
use crate::auth::{OAuthGrantClaims, ParsedToken, TokenError, OAUTH_ACCESS_TOKEN, OAUTH_AUTH_TOKEN};
use crate::context::RequestContext;
use crate::menu::{Menu, MenuEntry};
use crate::perms::Perm;

/// Lifetime of an authorization code, in minutes.
const AUTH_CODE_MINUTES: i64 = 1;

/// A request parameter from the query or, failing that, an unprotected
/// POST field. Missing or empty values are noted in `errs`.
fn oauth2_get(ctx: &RequestContext, errs: &mut Vec<String>, name: &str) -> String {
    let mut val = ctx.get_arg(name);
    let mut missing = false;

    if val.is_empty() {
        match ctx.form_value_no_csrf(name) {
            Ok(v) => val = v,
            Err(_) => missing = true,
        }
    }

    let val = val.trim().to_string();
    if missing {
        errs.push(format!("Missing {}", name));
    } else if val.is_empty() {
        errs.push(format!("Empty {}", name));
    }
    val
}

fn check_redirect(redirect: &str, errs: &mut Vec<String>) -> Option<Url> {
    if redirect.is_empty() {
        return None;
    }
    match Url::parse(redirect) {
        Ok(u) => Some(u),
        Err(e) => {
            errs.push(format!("Redirect URL could not be properly parsed: {}", e));
            None
        }
    }
}

fn with_query(mut url: Url, key: &str, value: &str) -> String {
    url.query_pairs_mut().append_pair(key, value);
    url.to_string()
}

fn authorize_buttons(ctx: &RequestContext) -> String {
    format!(
        "{}<input type=\"submit\" name=\"button\" value=\"Authorize\" />\n\
         <input type=\"submit\" name=\"button\" value=\"Deny\" />\n\
         </form>\n",
        ctx.csrf_form("")
    )
}

fn issue_access(ctx: &RequestContext, subject: &str, grant: &OAuthGrantClaims) -> Result<String, TokenError> {
    let minutes = ctx.portal().config.security.token_expiry_minutes;
    ctx.portal().tokens.issue(OAUTH_ACCESS_TOKEN, subject, minutes, grant.clone())
}

fn oauth2_authorize<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut errs = Vec::new();

        let grant = OAuthGrantClaims {
            oa_rtype: oauth2_get(ctx, &mut errs, "response_type"),
            oa_client_id: oauth2_get(ctx, &mut errs, "client_id"),
            oa_redirect: oauth2_get(ctx, &mut errs, "redirect_uri"),
            oa_scope: oauth2_get(ctx, &mut errs, "scope"),
        };

        match grant.oa_rtype.as_str() {
            "code" | "token" | "" => {}
            other => errs.push(format!("Not supported or unknown response_type {}", other)),
        }

        let redirect = check_redirect(&grant.oa_redirect, &mut errs);

        if !errs.is_empty() {
            h_errmsgs(ctx, errs).await;
            return;
        }

        // Authenticate first; the login page comes back here
        let Some(username) = ctx.username().map(str::to_string) else {
            h_login(ctx).await;
            return;
        };

        if ctx.is_post() {
            let button = match ctx.form_value("button").await {
                Ok(b) => b,
                Err(_) => {
                    h_errmsgs(ctx, vec!["No button was pressed".to_string()]).await;
                    return;
                }
            };

            match button.as_str() {
                "Authorize" => {
                    let Some(url) = redirect else {
                        h_error(ctx, StatusCode::INTERNAL_SERVER_ERROR).await;
                        return;
                    };

                    let tokens = &ctx.portal().tokens;
                    let issued = if grant.oa_rtype == "code" {
                        tokens
                            .issue(OAUTH_AUTH_TOKEN, &username, AUTH_CODE_MINUTES, grant.clone())
                            .map(|tok| with_query(url, "code", &tok))
                    } else {
                        issue_access(ctx, &username, &grant).map(|tok| with_query(url, "access_token", &tok))
                    };

                    match issued {
                        Ok(target) => ctx.set_redirect(&target, StatusCode::FOUND),
                        Err(e) => {
                            tracing::error!("OAuth2 token generation failed: {}", e);
                            h_errmsgs(ctx, vec!["Could not generate Token".to_string()]).await;
                        }
                    }
                    return;
                }
                "Deny" => {
                    ctx.set_redirect(&grant.oa_redirect, StatusCode::FOUND);
                    return;
                }
                // Not a valid button, show the page again
                _ => {}
            }
        }

        let form = authorize_buttons(ctx);
        let data = ctx.page_def().with(json!({
            "client_id": grant.oa_client_id,
            "scope": grant.oa_scope,
            "redirect_uri": grant.oa_redirect,
            "form": form,
        }));
        ctx.page_show("oauth2/authorize.tmpl", data);
    })
}

/// Exchange an authorization code for an access token.
fn oauth2_token<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut errs = Vec::new();

        let client_id = oauth2_get(ctx, &mut errs, "client_id");
        let grant_type = oauth2_get(ctx, &mut errs, "grant_type");
        let redirect = oauth2_get(ctx, &mut errs, "redirect_uri");
        let code = oauth2_get(ctx, &mut errs, "code");

        check_redirect(&redirect, &mut errs);

        let parsed = ctx.portal().tokens.parse::<OAuthGrantClaims>(&code, OAUTH_AUTH_TOKEN);
        if let Err(e) = &parsed {
            errs.push(e.to_string());
        }

        let parsed = match parsed {
            Ok(p) if errs.is_empty() => p,
            _ => {
                h_errmsgs(ctx, errs).await;
                return;
            }
        };

        let grant = parsed.envelope.claims;
        if grant.oa_client_id != client_id {
            h_errmsgs(ctx, vec!["Mismatching client_id".to_string()]).await;
            return;
        }

        if grant_type != "authorization_code" {
            h_errmsgs(ctx, vec![format!("Not supported or unknown grant_type {}", grant_type)]).await;
            return;
        }

        let token = match issue_access(ctx, &parsed.envelope.sub, &grant) {
            Ok(tok) => tok,
            Err(e) => {
                tracing::error!("OAuth2 access token generation failed: {}", e);
                h_errmsgs(ctx, vec!["Could not generate Token".to_string()]).await;
                return;
            }
        };

        // Codes are single use
        ctx.portal().tokens.revoke(&code);

        let system_name = ctx.portal().config.server.system_name.clone();
        ctx.set_json(&json!({
            "access_token": token,
            "token_type": "bearer",
            "scope": grant.oa_scope,
            "info": { "name": system_name },
        }));
    })
}

/// Parse `code` as an access token, or failing that as an authorization code.
fn parse_any(ctx: &RequestContext, code: &str) -> Result<ParsedToken<OAuthGrantClaims>, TokenError> {
    let tokens = &ctx.portal().tokens;
    tokens
        .parse::<OAuthGrantClaims>(code, OAUTH_ACCESS_TOKEN)
        .or_else(|_| tokens.parse::<OAuthGrantClaims>(code, OAUTH_AUTH_TOKEN))
}

fn oauth2_info<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut errs = Vec::new();
        let code = oauth2_get(ctx, &mut errs, "code");
        if !errs.is_empty() {
            h_errmsgs(ctx, errs).await;
            return;
        }

        let parsed = match parse_any(ctx, &code) {
            Ok(p) => p,
            Err(e) => {
                h_errmsgs(ctx, vec![e.to_string()]).await;
                return;
            }
        };

        let claims = parsed.envelope.claims;
        ctx.set_json(&json!({
            "client_id": claims.oa_client_id,
            "access_token": code,
            "token_type": "bearer",
            "scope": claims.oa_scope,
            "expires_in": parsed.envelope.exp - Utc::now().timestamp(),
        }));
    })
}

fn oauth2_index<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let data = ctx.page_def().with(json!({}));
        ctx.page_show("oauth2/index.tmpl", data);
    })
}

pub fn h_oauth2<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let menu = Menu::new(vec![
            MenuEntry::new("", "OAuth2 / OpenID Connect Information", Perm::NONE, oauth2_index),
            MenuEntry::new("authorize", "Authorize", Perm::NONE | Perm::HIDDEN | Perm::NOCRUMB, oauth2_authorize),
            MenuEntry::new("token", "Token", Perm::NONE | Perm::HIDDEN | Perm::NOCRUMB, oauth2_token),
            MenuEntry::new("info", "Info", Perm::NONE | Perm::HIDDEN | Perm::NOCRUMB, oauth2_info),
        ]);
        ctx.ui_menu(menu).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FormData;
    use crate::testing::{login_as, post_context, test_context, test_portal};

    #[derive(Debug, serde::Deserialize)]
    struct AccessTokenResponse {
        access_token: String,
        token_type: String,
        scope: String,
    }

    const AUTHORIZE: &str =
        "/oauth2/authorize/?response_type=code&client_id=app&redirect_uri=https%3A%2F%2Fapp.example%2Fcb%3Fs%3D1&scope=profile";

    fn in_oauth2(mut ctx: RequestContext) -> RequestContext {
        ctx.consume_segment();
        ctx
    }

    #[tokio::test]
    async fn test_authorize_validates_parameters() {
        let portal = test_portal();
        let mut ctx = in_oauth2(test_context(&portal, "GET", "/oauth2/authorize/?response_type=magic&client_id=app"));
        h_oauth2(&mut ctx).await;

        let data = ctx.template_data().unwrap();
        let msgs: Vec<String> = serde_json::from_value(data["messages"].clone()).unwrap();
        assert!(msgs.contains(&"Missing redirect_uri".to_string()));
        assert!(msgs.contains(&"Missing scope".to_string()));
        assert!(msgs.contains(&"Not supported or unknown response_type magic".to_string()));
    }

    #[tokio::test]
    async fn test_authorize_needs_login() {
        let portal = test_portal();
        let mut ctx = in_oauth2(test_context(&portal, "GET", AUTHORIZE));
        h_oauth2(&mut ctx).await;
        assert_eq!(ctx.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.template_name(), Some("misc/login.tmpl"));
    }

    #[tokio::test]
    async fn test_authorize_page() {
        let portal = test_portal();
        let mut ctx = in_oauth2(test_context(&portal, "GET", AUTHORIZE));
        login_as(&mut ctx, "alice");
        h_oauth2(&mut ctx).await;

        assert_eq!(ctx.template_name(), Some("oauth2/authorize.tmpl"));
        let data = ctx.template_data().unwrap();
        assert_eq!(data["client_id"], "app");
        assert_eq!(data["redirect_uri"], "https://app.example/cb?s=1");
        assert!(data["form"].as_str().unwrap().contains("value=\"Deny\""));
    }

    async fn authorize_with(portal: &std::sync::Arc<crate::portal::Portal>, button: &str) -> RequestContext {
        let mut seed = test_context(portal, "GET", AUTHORIZE);
        login_as(&mut seed, "alice");
        let form = FormData::new()
            .with_value("pfCSRF", &seed.csrf_token(""))
            .with_value("button", button);
        let mut ctx = in_oauth2(post_context(portal, AUTHORIZE, form));
        login_as(&mut ctx, "alice");
        h_oauth2(&mut ctx).await;
        ctx
    }

    #[tokio::test]
    async fn test_deny_returns_to_client() {
        let portal = test_portal();
        let ctx = authorize_with(&portal, "Deny").await;
        assert_eq!(ctx.status(), StatusCode::FOUND);
        assert_eq!(ctx.redirect_target(), Some("https://app.example/cb?s=1"));
    }

    #[tokio::test]
    async fn test_code_exchange() {
        let portal = test_portal();
        let ctx = authorize_with(&portal, "Authorize").await;
        assert_eq!(ctx.status(), StatusCode::FOUND);

        let target = Url::parse(ctx.redirect_target().unwrap()).unwrap();
        let pairs: Vec<(String, String)> = target.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("s".to_string(), "1".to_string()));
        assert_eq!(pairs[1].0, "code");
        let code = pairs[1].1.clone();

        let form = FormData::new()
            .with_value("client_id", "app")
            .with_value("grant_type", "authorization_code")
            .with_value("redirect_uri", "https://app.example/cb")
            .with_value("code", &code);
        let mut ctx = in_oauth2(post_context(&portal, "/oauth2/token/", form.clone()));
        h_oauth2(&mut ctx).await;

        assert_eq!(ctx.content_type(), Some("application/json"));
        let resp = ctx.flush().await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let answer: AccessTokenResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(answer.token_type, "bearer");
        assert_eq!(answer.scope, "profile");

        let access = portal
            .tokens
            .parse::<OAuthGrantClaims>(&answer.access_token, OAUTH_ACCESS_TOKEN)
            .unwrap();
        assert_eq!(access.envelope.sub, "alice");

        // the code cannot be used twice
        let mut again = in_oauth2(post_context(&portal, "/oauth2/token/", form));
        h_oauth2(&mut again).await;
        assert_eq!(again.template_data().unwrap()["messages"][0], "Token is invalid");
    }

    #[tokio::test]
    async fn test_token_rejects_other_client() {
        let portal = test_portal();
        let grant = OAuthGrantClaims {
            oa_client_id: "app".to_string(),
            oa_scope: "profile".to_string(),
            oa_rtype: "code".to_string(),
            oa_redirect: "https://app.example/cb".to_string(),
        };
        let code = portal.tokens.issue(OAUTH_AUTH_TOKEN, "alice", 1, grant).unwrap();
        let form = FormData::new()
            .with_value("client_id", "other")
            .with_value("grant_type", "authorization_code")
            .with_value("redirect_uri", "https://app.example/cb")
            .with_value("code", &code);
        let mut ctx = in_oauth2(post_context(&portal, "/oauth2/token/", form));
        h_oauth2(&mut ctx).await;
        assert_eq!(ctx.template_data().unwrap()["messages"][0], "Mismatching client_id");
    }

    #[tokio::test]
    async fn test_info_describes_access_token() {
        let portal = test_portal();
        let grant = OAuthGrantClaims {
            oa_client_id: "app".to_string(),
            oa_scope: "profile".to_string(),
            ..Default::default()
        };
        let tok = portal.tokens.issue(OAUTH_ACCESS_TOKEN, "alice", 20, grant).unwrap();
        let path = format!("/oauth2/info/?code={}", tok);
        let mut ctx = in_oauth2(test_context(&portal, "GET", &path));
        h_oauth2(&mut ctx).await;

        let resp = ctx.flush().await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["client_id"], "app");
        let expires_in = info["expires_in"].as_i64().unwrap();
        assert!(expires_in > 0 && expires_in <= 20 * 60);
    }
}
