//! Asset cache commands.
//!
//! # Usage
//!
//! ```bash
//! pricecheck cache list
//! pricecheck cache purge
//! ```
//!
//! The terminal recreates the current namespace on its next start.

use pricecheck_terminal::config::TerminalConfig;
use pricecheck_terminal::proxy::{CACHE_VERSION, CacheStorage};

use super::CommandError;

/// Print every cache namespace, oldest first, marking the current one.
///
/// # Errors
///
/// Returns `CommandError::Store` if the cache database cannot be read.
pub async fn list(config: &TerminalConfig) -> Result<(), CommandError> {
    let storage = CacheStorage::new(config.cache_location());
    let namespaces = storage.namespaces().await?;

    if namespaces.is_empty() {
        tracing::info!("Asset cache is empty");
        return Ok(());
    }

    #[allow(clippy::print_stdout)]
    for name in &namespaces {
        let marker = if name == CACHE_VERSION { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

/// Delete every cache namespace. Returns how many were deleted.
///
/// # Errors
///
/// Returns `CommandError::Store` if the cache database cannot be written.
pub async fn purge(config: &TerminalConfig) -> Result<usize, CommandError> {
    let storage = CacheStorage::new(config.cache_location());
    let purged = purge_all(&storage).await?;
    tracing::info!(purged, "Asset cache purged");
    Ok(purged)
}

async fn purge_all(storage: &CacheStorage) -> Result<usize, CommandError> {
    let mut purged = 0;
    for name in storage.namespaces().await? {
        if storage.delete_namespace(&name).await? {
            purged += 1;
        }
    }
    Ok(purged)
}
