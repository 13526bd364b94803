//! Device identity command.
//!
//! Resolves the identity exactly as the terminal does at startup, so running
//! it on a fresh install mints and persists the identifier.

use pricecheck_terminal::config::TerminalConfig;
use pricecheck_terminal::db::LocalCatalogStore;
use pricecheck_terminal::identity::{DeviceIdentityManager, FileEphemeralStore};
use serde_json::json;

use super::CommandError;

/// Print the device identity and catalog size as JSON.
///
/// # Errors
///
/// Returns `CommandError::Json` if the output cannot be rendered. Storage
/// problems are reported in the output instead.
pub async fn show(config: &TerminalConfig) -> Result<(), CommandError> {
    let ephemeral = FileEphemeralStore::open(config.ephemeral_path());
    let store = LocalCatalogStore::new(config.catalog_location());

    let identity = DeviceIdentityManager::new(ephemeral, store.clone())
        .resolve()
        .await;
    let products = store.product_count().await.ok();

    let report = json!({
        "identifier": identity.as_str(),
        "reserved": identity.is_reserved(),
        "store_id": config.store_id.as_i64(),
        "data_dir": config.data_dir.display().to_string(),
        "products": products,
    });

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
