//! Bulk catalog sync: download the full catalog, then swap it in.

use std::future::Future;

use thiserror::Error;
use tracing::{info, instrument};

use crate::backend::{BackendClient, BackendError, CatalogDownload};
use crate::db::{LocalCatalogStore, StoreError};
use crate::session::SessionContext;

/// Errors that can occur during a sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The catalog could not be downloaded. The local catalog is untouched.
    #[error("Catalog download failed: {0}")]
    Backend(#[from] BackendError),

    /// The catalog could not be written. The local catalog is untouched.
    #[error("Catalog write failed: {0}")]
    Store(#[from] StoreError),
}

/// Where the full catalog comes from.
pub trait CatalogSource: Send + Sync {
    /// Download every product.
    fn fetch_catalog(
        &self,
        session: &SessionContext,
    ) -> impl Future<Output = Result<CatalogDownload, BackendError>> + Send;
}

impl CatalogSource for BackendClient {
    async fn fetch_catalog(
        &self,
        session: &SessionContext,
    ) -> Result<CatalogDownload, BackendError> {
        Self::fetch_catalog(self, session).await
    }
}

/// Outcome of a completed sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    /// Records received from the backend.
    pub downloaded: usize,
    /// Records now in the local catalog.
    pub written: usize,
    /// Records dropped for lacking a barcode or failing to decode.
    pub skipped: usize,
}

/// Replace the local catalog with the backend's.
///
/// The download completes before the store is touched, and the clear and
/// bulk save commit together, so a failure at either step leaves the previous
/// catalog serving lookups.
///
/// # Errors
///
/// Returns `SyncError::Backend` if the download fails or `SyncError::Store` if
/// the write fails.
#[instrument(skip_all)]
pub async fn sync_catalog<S: CatalogSource>(
    source: &S,
    session: &SessionContext,
    store: &LocalCatalogStore,
) -> Result<SyncReport, SyncError> {
    let download = source.fetch_catalog(session).await?;
    let written = store.replace_products(&download.records).await?;

    let report = SyncReport {
        downloaded: download.len(),
        written,
        skipped: download.len() - written,
    };
    info!(
        downloaded = report.downloaded,
        written = report.written,
        skipped = report.skipped,
        "Catalog synced"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use pricecheck_core::{Barcode, ProductRecord};

    use super::*;
    use crate::db::StoreLocation;

    struct FixedSource(Result<CatalogDownload, u16>);

    impl FixedSource {
        fn records(records: Vec<ProductRecord>) -> Self {
            Self(Ok(CatalogDownload {
                records,
                malformed: 0,
            }))
        }
    }

    impl CatalogSource for FixedSource {
        async fn fetch_catalog(
            &self,
            _session: &SessionContext,
        ) -> Result<CatalogDownload, BackendError> {
            match &self.0 {
                Ok(download) => Ok(download.clone()),
                Err(code) => Err(BackendError::Status {
                    status: reqwest::StatusCode::from_u16(*code).unwrap(),
                    body: String::new(),
                }),
            }
        }
    }

    fn product(barcode: &str, cents: i64) -> ProductRecord {
        ProductRecord::new(Barcode::parse(barcode).unwrap(), "Item", Decimal::new(cents, 2))
    }

    #[tokio::test]
    async fn test_sync_replaces_catalog() {
        let store = LocalCatalogStore::new(StoreLocation::Memory);
        store.save_product(&product("stale", 100)).await.unwrap();

        let mut unkeyed = product("x", 1);
        unkeyed.barcode = None;
        let source = FixedSource::records(vec![product("1", 100), product("2", 200), unkeyed]);

        let report = sync_catalog(&source, &SessionContext::anonymous(), &store)
            .await
            .unwrap();

        assert_eq!(
            report,
            SyncReport {
                downloaded: 3,
                written: 2,
                skipped: 1
            }
        );
        assert_eq!(store.product_count().await.unwrap(), 2);
        assert!(
            store
                .get_product(&Barcode::parse("stale").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_sink_sync() {
        let store = LocalCatalogStore::new(StoreLocation::Memory);
        let entries = serde_json::from_str(
            r#"[{"barcode":"1","name":"Milk","price":4.5},{"barcode":"2","name":null,"price":2.0}]"#,
        )
        .unwrap();
        let source = FixedSource(Ok(CatalogDownload::from_entries(entries)));

        let report = sync_catalog(&source, &SessionContext::anonymous(), &store)
            .await
            .unwrap();

        assert_eq!(
            report,
            SyncReport {
                downloaded: 2,
                written: 1,
                skipped: 1
            }
        );
        let milk = store
            .get_product(&Barcode::parse("1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(milk.price, Decimal::new(45, 1));
    }

    #[tokio::test]
    async fn test_failed_download_keeps_catalog() {
        let store = LocalCatalogStore::new(StoreLocation::Memory);
        store.save_product(&product("1", 100)).await.unwrap();

        let result = sync_catalog(&FixedSource(Err(502)), &SessionContext::anonymous(), &store).await;

        assert!(matches!(result, Err(SyncError::Backend(_))));
        assert_eq!(store.product_count().await.unwrap(), 1);
    }
}
