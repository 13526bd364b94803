//! Versioned response cache.
//!
//! Entries are grouped into namespaces, one per cache version, and persisted in
//! `pricecheck-cache.db`. A `moka` layer keeps recently served entries in
//! memory; it is flushed whenever a namespace is deleted.
//!
//! # Schema
//!
//! - `cache_namespace (name, created_at)`
//! - `cache_entry (namespace, url, status, headers, body, stored_at)`

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use chrono::Utc;
use moka::future::Cache;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::db::{StoreError, StoreLocation, open_pool};

use super::request::{ProxyResponse, ResponseSource};

/// File name of the cache database inside the data directory.
pub const CACHE_DATABASE_NAME: &str = "pricecheck-cache.db";

const SCHEMA_VERSION: i64 = 1;
const HOT_CAPACITY: u64 = 256;
const HOT_IDLE: Duration = Duration::from_secs(600);

type HotKey = (String, String);

/// Namespaced response storage.
///
/// Cheap to clone; clones share the pool and the in-memory layer.
#[derive(Clone)]
pub struct CacheStorage {
    inner: Arc<CacheStorageInner>,
}

struct CacheStorageInner {
    location: StoreLocation,
    pool: OnceCell<SqlitePool>,
    hot: Cache<HotKey, ProxyResponse>,
}

impl CacheStorage {
    /// Create storage at `location`. Nothing is opened until first use.
    #[must_use]
    pub fn new(location: StoreLocation) -> Self {
        let hot = Cache::builder()
            .max_capacity(HOT_CAPACITY)
            .time_to_idle(HOT_IDLE)
            .build();

        Self {
            inner: Arc::new(CacheStorageInner {
                location,
                pool: OnceCell::new(),
                hot,
            }),
        }
    }

    async fn open(&self) -> Result<&SqlitePool, StoreError> {
        self.inner
            .pool
            .get_or_try_init(|| async {
                let pool = open_pool(&self.inner.location).await?;
                create_schema(&pool).await?;
                Ok(pool)
            })
            .await
    }

    /// Make sure namespace `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or written.
    pub async fn open_namespace(&self, name: &str) -> Result<(), StoreError> {
        let pool = self.open().await?;
        sqlx::query("INSERT OR IGNORE INTO cache_namespace (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Every namespace, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or read.
    pub async fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        let pool = self.open().await?;
        let names = sqlx::query_scalar("SELECT name FROM cache_namespace ORDER BY created_at, name")
            .fetch_all(pool)
            .await?;
        Ok(names)
    }

    /// Delete namespace `name` and all of its entries.
    ///
    /// Returns whether the namespace existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or written.
    #[instrument(skip(self))]
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, StoreError> {
        let pool = self.open().await?;

        let mut tx = pool.begin().await?;
        let entries = sqlx::query("DELETE FROM cache_entry WHERE namespace = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let existed = sqlx::query("DELETE FROM cache_namespace WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;

        self.inner.hot.invalidate_all();
        debug!(entries, existed, "Deleted cache namespace");
        Ok(existed)
    }

    /// Store one response.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or written.
    pub async fn put(
        &self,
        namespace: &str,
        url: &str,
        response: &ProxyResponse,
    ) -> Result<(), StoreError> {
        self.put_all(namespace, &[(url.to_string(), response.clone())])
            .await
    }

    /// Store a batch of responses in one transaction, creating the namespace
    /// if needed. Either every entry is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or any write fails.
    #[instrument(skip(self, entries), fields(batch = entries.len()))]
    pub async fn put_all(
        &self,
        namespace: &str,
        entries: &[(String, ProxyResponse)],
    ) -> Result<(), StoreError> {
        let pool = self.open().await?;
        let now = Utc::now();

        let mut tx = pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO cache_namespace (name, created_at) VALUES (?, ?)")
            .bind(namespace)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for (url, response) in entries {
            let headers = encode_headers(&response.headers).map_err(|e| StoreError::Corrupt {
                key: url.clone(),
                reason: e.to_string(),
            })?;

            sqlx::query(
                r"
                INSERT INTO cache_entry (namespace, url, status, headers, body, stored_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (namespace, url) DO UPDATE
                SET status = excluded.status,
                    headers = excluded.headers,
                    body = excluded.body,
                    stored_at = excluded.stored_at
                ",
            )
            .bind(namespace)
            .bind(url)
            .bind(i64::from(response.status.as_u16()))
            .bind(headers)
            .bind(response.body.as_ref())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        for (url, response) in entries {
            self.inner
                .hot
                .insert(
                    (namespace.to_string(), url.clone()),
                    response.clone().with_source(ResponseSource::Cache),
                )
                .await;
        }
        Ok(())
    }

    /// Find a cached response for `url` in any namespace, preferring `prefer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or read.
    pub async fn match_url(
        &self,
        url: &str,
        prefer: &str,
    ) -> Result<Option<ProxyResponse>, StoreError> {
        let key = (prefer.to_string(), url.to_string());
        if let Some(hit) = self.inner.hot.get(&key).await {
            return Ok(Some(hit));
        }

        let pool = self.open().await?;
        let row: Option<(String, i64, String, Vec<u8>)> = sqlx::query_as(
            r"
            SELECT namespace, status, headers, body
            FROM cache_entry
            WHERE url = ?
            ORDER BY namespace = ? DESC, stored_at DESC
            LIMIT 1
            ",
        )
        .bind(url)
        .bind(prefer)
        .fetch_optional(pool)
        .await?;

        let Some((namespace, status, headers, body)) = row else {
            return Ok(None);
        };

        let response = decode_entry(url, status, &headers, body)?;
        if namespace == prefer {
            self.inner.hot.insert(key, response.clone()).await;
        } else {
            debug!(url, namespace, "Served from a previous cache version");
        }
        Ok(Some(response))
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS cache_namespace (
            name TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS cache_entry (
            namespace TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            stored_at TEXT NOT NULL,
            PRIMARY KEY (namespace, url)
        )
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Headers as a JSON list of pairs. Values that are not UTF-8 are dropped.
fn encode_headers(headers: &HeaderMap) -> Result<String, serde_json::Error> {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect();
    serde_json::to_string(&pairs)
}

fn decode_entry(
    url: &str,
    status: i64,
    headers: &str,
    body: Vec<u8>,
) -> Result<ProxyResponse, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: url.to_string(),
        reason,
    };

    let status = u16::try_from(status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| corrupt(format!("invalid status {status}")))?;

    let pairs: Vec<(String, String)> =
        serde_json::from_str(headers).map_err(|e| corrupt(e.to_string()))?;

    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!(url, header = %name, "Skipping unreadable cached header"),
        }
    }

    Ok(ProxyResponse {
        status,
        headers: map,
        body: Bytes::from(body),
        source: ResponseSource::Cache,
    })
}
