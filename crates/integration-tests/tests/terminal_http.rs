//! The terminal's HTTP surface end to end: session guard, proxy and local API.

#![allow(clippy::unwrap_used)]

use pricecheck_integration_tests::{
    FakeBackend, FakeOrigin, TestTerminal, asset_body, client, token_expiring_at,
};
use reqwest::{StatusCode, header};
use serde_json::{Value, json};

const HTML: &str = "text/html";

#[tokio::test]
async fn test_protected_navigation_without_token_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let backend = FakeBackend::start(Vec::new()).await;
    let terminal = TestTerminal::start(&dir, &origin.url, &backend.base).await;

    let response = client()
        .get(terminal.at("/scan"))
        .header(header::ACCEPT, HTML)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let expired = token_expiring_at(chrono::Utc::now().timestamp() - 60);
    let response = client()
        .get(terminal.at("/scan"))
        .header(header::ACCEPT, HTML)
        .header(header::COOKIE, format!("pricecheck_token={expired}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.starts_with("pricecheck_token=;"));
}

#[tokio::test]
async fn test_valid_session_reaches_the_app_shell() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let backend = FakeBackend::start(Vec::new()).await;
    let terminal = TestTerminal::start(&dir, &origin.url, &backend.base).await;

    let scan = terminal.at("/scan");
    assert!(terminal.background.proxy.await.unwrap().is_some());

    let valid = token_expiring_at(chrono::Utc::now().timestamp() + 3600);
    let response = client()
        .get(scan)
        .header(header::ACCEPT, HTML)
        .bearer_auth(valid)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-pricecheck-source"], "cache");
    assert_eq!(response.text().await.unwrap(), asset_body("/index.html"));
}

#[tokio::test]
async fn test_sync_then_lookup_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let backend = FakeBackend::start(vec![
        json!({"barcode": "123", "name": "Milk", "price": "4.50"}),
        json!({"name": "no barcode"}),
        json!({"barcode": "2", "name": null, "price": 2.0}),
    ])
    .await;
    let terminal = TestTerminal::start(&dir, &origin.url, &backend.base).await;

    let token = token_expiring_at(chrono::Utc::now().timestamp() + 3600);
    let report: Value = client()
        .post(terminal.at("/_pricecheck/sync"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["downloaded"], 3);
    assert_eq!(report["written"], 1);
    assert_eq!(report["skipped"], 2);
    assert_eq!(
        backend.recorded(|r| r.catalog_auth.clone()),
        vec![Some(format!("Bearer {token}"))]
    );

    let milk: Value = client()
        .get(terminal.at("/_pricecheck/products/123"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(milk["name"], "Milk");
    assert_eq!(milk["price"], "4.50");

    let missing = client()
        .get(terminal.at("/_pricecheck/products/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_device_endpoint_reports_identity() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let backend = FakeBackend::start(Vec::new()).await;
    let terminal = TestTerminal::start(&dir, &origin.url, &backend.base).await;

    let info: Value = client()
        .get(terminal.at("/_pricecheck/device"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(info["identifier"], terminal.state.identity().as_str());
    assert_eq!(info["reserved"], false);
    assert_eq!(info["products"], 0);
}
