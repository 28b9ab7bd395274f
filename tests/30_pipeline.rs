mod common;

use axum::http::{header, StatusCode};

use common::*;

#[tokio::test]
async fn anonymous_home_page() {
    let portal = test_portal();
    let resp = send(app(&portal), get("/")).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = body_text(resp).await;
    assert!(html.contains("<div class=\"home\">"));
    assert!(html.contains("href=\"/login/\""));
}

#[tokio::test]
async fn unknown_page_is_not_found() {
    let portal = test_portal();
    let resp = send(app(&portal), get("/404")).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_text(resp).await.contains("Not Found"));
}

#[tokio::test]
async fn post_without_csrf_is_refused_and_counted() {
    let portal = test_portal();
    let cookie = session_cookie(&portal, "alice");

    let req = post_form("/cli/", &[("cmd", "system whoami")], Some(&cookie));
    let resp = send(app(&portal), req).await;

    let html = body_text(resp).await;
    assert!(html.contains("Invalid CSRF token"));
    assert_eq!(portal.iptrk.hits(&client_ip()).await, 1);
}

#[tokio::test]
async fn protected_page_asks_for_login() {
    let portal = test_portal();
    let resp = send(app(&portal), get("/system/")).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let html = body_text(resp).await;
    assert!(html.contains("name=\"username\""));
    assert!(extract_csrf(&html).is_some());
}

#[tokio::test]
async fn login_form_round_trip() {
    let portal = test_portal();

    let resp = send(app(&portal), get("/login/")).await;
    let csrf = extract_csrf(&body_text(resp).await).expect("csrf token in login form");

    let req = post_form(
        "/login/",
        &[
            ("pfCSRF", csrf.as_str()),
            ("username", "alice"),
            ("password", "wonderland"),
            ("twofactor", ""),
            ("comeback", ""),
        ],
        None,
    );
    let resp = send(app(&portal), req).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/user/alice/");
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("_portal="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn wrong_password_counts_against_ip() {
    let portal = test_portal();

    let resp = send(app(&portal), get("/login/")).await;
    let csrf = extract_csrf(&body_text(resp).await).unwrap();

    let req = post_form(
        "/login/",
        &[
            ("pfCSRF", csrf.as_str()),
            ("username", "alice"),
            ("password", "queen-of-hearts"),
            ("twofactor", ""),
        ],
        None,
    );
    let resp = send(app(&portal), req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(portal.iptrk.hits(&client_ip()).await >= 1);
}

#[tokio::test]
async fn session_cookie_reaches_own_profile() {
    let portal = test_portal();
    let cookie = session_cookie(&portal, "alice");

    let req = axum::http::Request::get("/user/alice/")
        .header("host", HOST)
        .header("cookie", &cookie)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = send(app(&portal), req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("alice"));
}

#[tokio::test]
async fn tilde_shortcut_redirects() {
    let portal = test_portal();
    let resp = send(app(&portal), get("/~alice")).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/user/alice/");
}
