mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::Value;

use common::*;

#[tokio::test]
async fn health_in_process() {
    let portal = test_portal();
    let resp = send(app(&portal), get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["data"]["status"], "ok");
    assert!(v["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn health_over_tcp() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::get(format!("{}/health", server.base_url)).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let v: Value = resp.json().await?;
    assert_eq!(v["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn home_over_tcp() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::get(format!("{}/", server.base_url)).await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp.text().await?.contains("<div class=\"home\">"));
    Ok(())
}
