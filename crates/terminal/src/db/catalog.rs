//! Durable local catalog store.
//!
//! Holds the product catalog for offline lookups and the durable copy of the
//! device identity. The database is opened lazily on first use; a failed open
//! is not remembered, so the next call tries again.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use pricecheck_core::{Barcode, ProductRecord};

use super::{StoreError, StoreLocation, is_missing_table, open_pool};

/// File name of the catalog database inside the data directory.
pub const DATABASE_NAME: &str = "pricecheck.db";

/// Current schema version.
///
/// - 1: `products`
/// - 2: `device_info`
pub const SCHEMA_VERSION: i64 = 2;

/// Key of the device identity row in `device_info`.
const DEVICE_UUID_KEY: &str = "uuid";

/// Client-local, transactional catalog store.
///
/// Cheap to clone; clones share the same lazily opened pool.
#[derive(Clone)]
pub struct LocalCatalogStore {
    inner: Arc<LocalCatalogStoreInner>,
}

struct LocalCatalogStoreInner {
    location: StoreLocation,
    pool: OnceCell<SqlitePool>,
}

impl LocalCatalogStore {
    /// Create a store for `location`. No I/O happens until the first operation.
    #[must_use]
    pub fn new(location: StoreLocation) -> Self {
        Self {
            inner: Arc::new(LocalCatalogStoreInner {
                location,
                pool: OnceCell::new(),
            }),
        }
    }

    /// Wrap an already-open pool as-is, without running the schema upgrade.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(LocalCatalogStoreInner {
                location: StoreLocation::Memory,
                pool: OnceCell::from(pool),
            }),
        }
    }

    /// Open (creating on first use) the database and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StorageUnavailable` if the database cannot be opened,
    /// or `StoreError::TransactionFailed` if the schema upgrade fails.
    pub async fn open(&self) -> Result<&SqlitePool, StoreError> {
        self.inner
            .pool
            .get_or_try_init(|| async {
                let pool = open_pool(&self.inner.location).await?;
                upgrade_schema(&pool).await?;
                Ok(pool)
            })
            .await
    }

    /// Look up a product by barcode.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read. Absence is `Ok(None)`.
    #[instrument(skip(self), fields(barcode = %barcode))]
    pub async fn get_product(&self, barcode: &Barcode) -> Result<Option<ProductRecord>, StoreError> {
        let pool = self.open().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM products WHERE barcode = ?")
            .bind(barcode.as_str())
            .fetch_optional(pool)
            .await?;

        row.map(|(json,)| decode_record(barcode, &json)).transpose()
    }

    /// Upsert a single product.
    ///
    /// Returns the number of records written (0 if the record has no barcode).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the write fails.
    pub async fn save_product(&self, record: &ProductRecord) -> Result<usize, StoreError> {
        self.save_products(std::slice::from_ref(record)).await
    }

    /// Upsert many products in one transaction.
    ///
    /// Records without a barcode are skipped. Either every remaining record is
    /// committed or none are.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or any write fails; in
    /// that case nothing from the batch is committed.
    #[instrument(skip_all, fields(batch = records.len()))]
    pub async fn save_products(&self, records: &[ProductRecord]) -> Result<usize, StoreError> {
        let pool = self.open().await?;

        let mut tx = pool.begin().await?;
        let written = upsert_products(&mut tx, records).await?;
        tx.commit().await?;

        debug!(
            written,
            skipped = records.len() - written,
            "Saved products"
        );
        Ok(written)
    }

    /// Replace the whole catalog with `records` in one transaction.
    ///
    /// Readers see either the old catalog or the new one, never an empty table
    /// in between. Records without a barcode are skipped.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or any write fails; the
    /// previous catalog is then left untouched.
    #[instrument(skip_all, fields(batch = records.len()))]
    pub async fn replace_products(&self, records: &[ProductRecord]) -> Result<usize, StoreError> {
        let pool = self.open().await?;

        let mut tx = pool.begin().await?;
        let removed = sqlx::query("DELETE FROM products")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let written = upsert_products(&mut tx, records).await?;
        tx.commit().await?;

        debug!(removed, written, "Replaced catalog");
        Ok(written)
    }

    /// Remove every product.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the delete fails.
    pub async fn clear_products(&self) -> Result<u64, StoreError> {
        let pool = self.open().await?;

        let mut tx = pool.begin().await?;
        let removed = sqlx::query("DELETE FROM products")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(removed, "Cleared products");
        Ok(removed)
    }

    /// Number of products currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read.
    pub async fn product_count(&self) -> Result<u64, StoreError> {
        let pool = self.open().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Store the device identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the write fails.
    pub async fn save_device_uuid(&self, uuid: &str) -> Result<(), StoreError> {
        let pool = self.open().await?;

        sqlx::query(
            r"
            INSERT INTO device_info (key, value)
            VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(DEVICE_UUID_KEY)
        .bind(uuid)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Read the device identity.
    ///
    /// Returns `None` if none has been stored, including when the `device_info`
    /// table does not exist in an older database.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the read fails for a
    /// reason other than the missing table.
    pub async fn get_device_uuid(&self) -> Result<Option<String>, StoreError> {
        let pool = self.open().await?;

        match sqlx::query_scalar::<_, String>("SELECT value FROM device_info WHERE key = ?")
            .bind(DEVICE_UUID_KEY)
            .fetch_optional(pool)
            .await
        {
            Ok(value) => Ok(value),
            Err(e) if is_missing_table(&e) => {
                debug!("device_info table missing, treating identity as absent");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Upsert `records` inside `tx`, skipping those without a barcode.
async fn upsert_products(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    records: &[ProductRecord],
) -> Result<usize, StoreError> {
    let updated_at = Utc::now();
    let mut written = 0;

    for record in records {
        let Some(barcode) = record.key() else {
            continue;
        };

        let json = serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
            key: barcode.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r"
            INSERT INTO products (barcode, record, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (barcode) DO UPDATE
            SET record = excluded.record, updated_at = excluded.updated_at
            ",
        )
        .bind(barcode.as_str())
        .bind(json)
        .bind(updated_at)
        .execute(&mut **tx)
        .await?;

        written += 1;
    }

    Ok(written)
}

/// Create any missing tables and record the schema version.
async fn upgrade_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS products (
            barcode TEXT PRIMARY KEY NOT NULL,
            record TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS device_info (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )
        ",
    )
    .execute(&mut *tx)
    .await?;

    if current < SCHEMA_VERSION {
        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if current < SCHEMA_VERSION {
        tracing::info!(from = current, to = SCHEMA_VERSION, "Upgraded catalog schema");
    }
    Ok(())
}

fn decode_record(barcode: &Barcode, json: &str) -> Result<ProductRecord, StoreError> {
    let mut record: ProductRecord =
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
            key: barcode.to_string(),
            reason: e.to_string(),
        })?;
    // The row key is authoritative
    record.barcode = Some(barcode.clone());
    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn memory_store() -> LocalCatalogStore {
        LocalCatalogStore::new(StoreLocation::Memory)
    }

    fn product(barcode: &str, name: &str, cents: i64) -> ProductRecord {
        ProductRecord::new(Barcode::parse(barcode).unwrap(), name, Decimal::new(cents, 2))
    }

    fn barcode(s: &str) -> Barcode {
        Barcode::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_product_is_none() {
        let store = memory_store();
        assert!(store.get_product(&barcode("404")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_get_product() {
        let store = memory_store();
        let milk = product("123", "Milk", 450).with_field("unit", "1L");

        assert_eq!(store.save_product(&milk).await.unwrap(), 1);
        assert_eq!(store.get_product(&barcode("123")).await.unwrap(), Some(milk));
    }

    #[tokio::test]
    async fn test_save_products_skips_records_without_barcode() {
        let store = memory_store();
        let mut loose = product("1", "Loose apples", 99);
        loose.barcode = None;

        let batch = vec![
            product("10", "Bread", 299),
            loose,
            product("11", "Butter", 349),
        ];

        assert_eq!(store.save_products(&batch).await.unwrap(), 2);
        assert_eq!(store.product_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_products_upserts() {
        let store = memory_store();
        store.save_product(&product("5", "Eggs", 300)).await.unwrap();
        store.save_product(&product("5", "Eggs (dozen)", 420)).await.unwrap();

        let stored = store.get_product(&barcode("5")).await.unwrap().unwrap();
        assert_eq!(stored.name, "Eggs (dozen)");
        assert_eq!(stored.price, Decimal::new(420, 2));
        assert_eq!(store.product_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_products() {
        let store = memory_store();
        store
            .save_products(&[product("1", "A", 100), product("2", "B", 200)])
            .await
            .unwrap();

        assert_eq!(store.clear_products().await.unwrap(), 2);
        assert!(store.get_product(&barcode("1")).await.unwrap().is_none());
        assert!(store.get_product(&barcode("2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_products_drops_stale_records() {
        let store = memory_store();
        store
            .save_products(&[product("1", "Old", 100), product("2", "Kept", 200)])
            .await
            .unwrap();

        let written = store
            .replace_products(&[product("2", "Kept", 250), product("3", "New", 300)])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.product_count().await.unwrap(), 2);
        assert!(store.get_product(&barcode("1")).await.unwrap().is_none());
        assert_eq!(
            store.get_product(&barcode("2")).await.unwrap().unwrap().price,
            Decimal::new(250, 2)
        );
    }

    #[tokio::test]
    async fn test_device_uuid_round_trip() {
        let store = memory_store();
        assert!(store.get_device_uuid().await.unwrap().is_none());

        store.save_device_uuid("first").await.unwrap();
        store.save_device_uuid("second").await.unwrap();
        assert_eq!(store.get_device_uuid().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_device_uuid_missing_table_is_none() {
        // Version 1 database: products only
        let pool = open_pool(&StoreLocation::Memory).await.unwrap();
        sqlx::query("CREATE TABLE products (barcode TEXT PRIMARY KEY, record TEXT, updated_at TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let store = LocalCatalogStore::from_pool(pool);
        assert!(store.get_device_uuid().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_upgrades_version_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DATABASE_NAME);

        let pool = open_pool(&StoreLocation::File(path.clone())).await.unwrap();
        sqlx::query("CREATE TABLE products (barcode TEXT PRIMARY KEY NOT NULL, record TEXT NOT NULL, updated_at TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("PRAGMA user_version = 1").execute(&pool).await.unwrap();
        pool.close().await;

        let store = LocalCatalogStore::new(StoreLocation::File(path));
        store.save_device_uuid("abc").await.unwrap();

        let pool = store.open().await.unwrap();
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_schema_upgrade_is_idempotent() {
        let store = memory_store();
        let pool = store.open().await.unwrap();
        upgrade_schema(pool).await.unwrap();
        upgrade_schema(pool).await.unwrap();
        store.save_product(&product("7", "Tea", 250)).await.unwrap();
        assert_eq!(store.product_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_storage_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, b"file in the way").unwrap();

        let store = LocalCatalogStore::new(StoreLocation::File(blocker.join(DATABASE_NAME)));
        let err = store.product_count().await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));

        // Clear the obstruction; the next call opens successfully
        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(store.product_count().await.unwrap(), 0);
    }
}
