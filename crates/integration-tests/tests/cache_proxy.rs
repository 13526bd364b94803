//! Cache proxy scenarios against a real upstream server.

#![allow(clippy::unwrap_used)]

use pricecheck_integration_tests::{FakeOrigin, UNREACHABLE, asset_body};
use pricecheck_terminal::db::StoreLocation;
use pricecheck_terminal::proxy::manifest::SHELL_DOCUMENT;
use pricecheck_terminal::proxy::{
    CACHE_VERSION, CacheProxy, CacheStorage, HttpFetcher, InterceptedRequest, Manifest,
    ProxyState, ResponseSource,
};

fn file_storage(dir: &tempfile::TempDir) -> CacheStorage {
    CacheStorage::new(StoreLocation::File(dir.path().join("pricecheck-cache.db")))
}

fn offline_proxy(storage: CacheStorage) -> CacheProxy<HttpFetcher> {
    CacheProxy::new(
        HttpFetcher::new(UNREACHABLE.parse().unwrap()),
        storage,
        Manifest::default(),
    )
}

#[tokio::test]
async fn test_activation_leaves_one_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let storage = file_storage(&dir);
    storage.open_namespace("pricecheck-v1").await.unwrap();

    let proxy = CacheProxy::new(
        HttpFetcher::new(origin.url.clone()),
        storage.clone(),
        Manifest::default(),
    );
    let report = proxy.install_and_activate().await.unwrap();

    assert_eq!(report.purged, vec!["pricecheck-v1".to_string()]);
    assert_eq!(proxy.state(), ProxyState::Active);
    assert_eq!(storage.namespaces().await.unwrap(), vec![CACHE_VERSION.to_string()]);
    assert_eq!(origin.hits(SHELL_DOCUMENT), 1);
}

#[tokio::test]
async fn test_shell_served_offline_after_install() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;

    let online = CacheProxy::new(
        HttpFetcher::new(origin.url.clone()),
        file_storage(&dir),
        Manifest::default(),
    );
    online.install_and_activate().await.unwrap();

    // A fresh process whose upstream is gone
    let offline = offline_proxy(file_storage(&dir));

    let page = offline
        .handle(&InterceptedRequest::navigation("/scan/4006381333931"))
        .await
        .unwrap();
    assert_eq!(page.source, ResponseSource::Cache);
    assert_eq!(page.body, asset_body(SHELL_DOCUMENT).as_bytes());

    let script = offline
        .handle(&InterceptedRequest::get("/assets/index.js"))
        .await
        .unwrap();
    assert_eq!(script.source, ResponseSource::Cache);
    assert_eq!(script.body, asset_body("/assets/index.js").as_bytes());
}

#[tokio::test]
async fn test_build_assets_are_cache_first() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let proxy = CacheProxy::new(
        HttpFetcher::new(origin.url.clone()),
        file_storage(&dir),
        Manifest::default(),
    );
    proxy.install_and_activate().await.unwrap();
    assert_eq!(origin.hits("/assets/vendor.js"), 1);

    for _ in 0..3 {
        let response = proxy
            .handle(&InterceptedRequest::get("/assets/vendor.js"))
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
    }
    assert_eq!(origin.hits("/assets/vendor.js"), 1);
}

#[tokio::test]
async fn test_navigation_with_nothing_cached_is_offline() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = offline_proxy(file_storage(&dir));

    let response = proxy
        .handle(&InterceptedRequest::navigation("/"))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 503);
    assert_eq!(response.source, ResponseSource::Offline);
    assert_eq!(response.body, "Offline".as_bytes());
}

#[tokio::test]
async fn test_failed_install_keeps_serving_previous_cache() {
    let dir = tempfile::tempdir().unwrap();
    let origin = FakeOrigin::start().await;
    let online = CacheProxy::new(
        HttpFetcher::new(origin.url.clone()),
        file_storage(&dir),
        Manifest::default(),
    );
    online.install_and_activate().await.unwrap();

    let next_version = Manifest {
        version: "pricecheck-v3".to_string(),
        ..Manifest::default()
    };
    let storage = file_storage(&dir);
    let upgrade = CacheProxy::new(
        HttpFetcher::new(UNREACHABLE.parse().unwrap()),
        storage.clone(),
        next_version,
    );

    assert!(upgrade.install_and_activate().await.is_err());
    assert_eq!(upgrade.state(), ProxyState::Installing);
    assert!(storage.namespaces().await.unwrap().contains(&CACHE_VERSION.to_string()));

    let page = upgrade
        .handle(&InterceptedRequest::navigation("/"))
        .await
        .unwrap();
    assert_eq!(page.source, ResponseSource::Cache);
}
