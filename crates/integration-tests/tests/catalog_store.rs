//! Local catalog scenarios against a file-backed store.

#![allow(clippy::unwrap_used)]

use pricecheck_core::{Barcode, ProductRecord};
use pricecheck_terminal::db::{LocalCatalogStore, StoreLocation};
use rust_decimal::Decimal;
use serde_json::json;

fn file_store(dir: &tempfile::TempDir) -> LocalCatalogStore {
    LocalCatalogStore::new(StoreLocation::File(dir.path().join("pricecheck.db")))
}

#[tokio::test]
async fn test_milk_round_trip_then_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    let barcode = Barcode::parse("123").unwrap();
    let milk = ProductRecord::new(barcode.clone(), "Milk", Decimal::new(450, 2));

    assert_eq!(store.save_product(&milk).await.unwrap(), 1);
    let found = store.get_product(&barcode).await.unwrap().unwrap();
    assert_eq!(found.name, "Milk");
    assert_eq!(found.price, Decimal::new(450, 2));

    store.clear_products().await.unwrap();
    assert!(store.get_product(&barcode).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_skips_records_without_barcode() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let batch: Vec<ProductRecord> = serde_json::from_value(json!([
        {"barcode": "111", "name": "Bread", "price": "2.10", "unit": "loaf"},
        {"barcode": "", "name": "Blank"},
        {"name": "Missing"},
        {"barcode": 222, "name": "Eggs", "price": "3.99"},
    ]))
    .unwrap();

    assert_eq!(store.save_products(&batch).await.unwrap(), 2);
    assert_eq!(store.product_count().await.unwrap(), 2);

    let bread = store
        .get_product(&Barcode::parse("111").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bread.extra["unit"], "loaf");
    assert!(
        store
            .get_product(&Barcode::parse("222").unwrap())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_catalog_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let barcode = Barcode::parse("4006381333931").unwrap();

    {
        let store = file_store(&dir);
        let pen = ProductRecord::new(barcode.clone(), "Pen", Decimal::new(199, 2));
        store.save_product(&pen).await.unwrap();
    }

    let reopened = file_store(&dir);
    let found = reopened.get_product(&barcode).await.unwrap().unwrap();
    assert_eq!(found.name, "Pen");
}
