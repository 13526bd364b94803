//! Catalog commands.
//!
//! # Usage
//!
//! ```bash
//! pricecheck lookup 4006381333931
//! pricecheck sync
//! pricecheck clear
//! ```
//!
//! # Environment Variables
//!
//! - `PRICECHECK_DATA_DIR` - Directory holding `pricecheck.db`
//! - `PRICECHECK_API_TOKEN` - Token for the catalog download (else the one the
//!   web app stored)

use pricecheck_core::{Barcode, ProductRecord};
use pricecheck_terminal::config::TerminalConfig;
use pricecheck_terminal::db::LocalCatalogStore;
use pricecheck_terminal::identity::FileEphemeralStore;
use pricecheck_terminal::session::SessionContext;
use pricecheck_terminal::state::backend_for;
use pricecheck_terminal::sync::sync_catalog;

use super::CommandError;

/// Print the product with `barcode` as JSON.
///
/// # Errors
///
/// Returns `CommandError::NotFound` if the catalog has no such product.
pub async fn lookup(config: &TerminalConfig, barcode: &str) -> Result<(), CommandError> {
    let store = LocalCatalogStore::new(config.catalog_location());
    let product = find(&store, barcode).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&product)?);
    }
    Ok(())
}

async fn find(store: &LocalCatalogStore, barcode: &str) -> Result<ProductRecord, CommandError> {
    let barcode = Barcode::parse(barcode)?;
    store
        .get_product(&barcode)
        .await?
        .ok_or_else(|| CommandError::NotFound(barcode.to_string()))
}

/// Download the catalog and replace the local copy.
///
/// # Errors
///
/// Returns `CommandError::Sync` if the download or the write fails; the local
/// catalog is left as it was.
pub async fn sync(config: &TerminalConfig) -> Result<(), CommandError> {
    let ephemeral = FileEphemeralStore::open(config.ephemeral_path());
    let session = config
        .session()
        .unwrap_or_else(|| SessionContext::from_store(&ephemeral));
    let backend = backend_for(config, &ephemeral);
    let store = LocalCatalogStore::new(config.catalog_location());

    tracing::info!(api = %backend.base(), "Downloading catalog...");
    let report = sync_catalog(&backend, &session, &store).await?;

    tracing::info!(
        downloaded = report.downloaded,
        written = report.written,
        skipped = report.skipped,
        "Catalog sync complete"
    );
    Ok(())
}

/// Remove every product. Returns how many were removed.
///
/// # Errors
///
/// Returns `CommandError::Store` if the catalog cannot be written.
pub async fn clear(config: &TerminalConfig) -> Result<u64, CommandError> {
    let store = LocalCatalogStore::new(config.catalog_location());
    let removed = store.clear_products().await?;
    tracing::info!(removed, "Catalog cleared");
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pricecheck_terminal::db::StoreLocation;
    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn test_find() {
        let store = LocalCatalogStore::new(StoreLocation::Memory);
        let milk = ProductRecord::new(Barcode::parse("123").unwrap(), "Milk", Decimal::new(450, 2));
        store.save_product(&milk).await.unwrap();

        assert_eq!(find(&store, " 123 ").await.unwrap(), milk);
        assert!(matches!(
            find(&store, "999").await,
            Err(CommandError::NotFound(code)) if code == "999"
        ));
        assert!(matches!(
            find(&store, "").await,
            Err(CommandError::InvalidBarcode(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let config = TerminalConfig::from_lookup(|key| {
            (key == "PRICECHECK_DATA_DIR").then(|| data_dir.clone())
        })
        .unwrap();

        let store = LocalCatalogStore::new(config.catalog_location());
        let milk = ProductRecord::new(Barcode::parse("123").unwrap(), "Milk", Decimal::new(450, 2));
        store.save_product(&milk).await.unwrap();

        assert_eq!(clear(&config).await.unwrap(), 1);
        assert_eq!(store.product_count().await.unwrap(), 0);
    }
}
