//! Aggregation service orchestrating cache, fetcher, and normalization
//!
//! One service instance owns the configuration, the cache store, and the
//! upstream fetcher. It warms all targets concurrently at startup and
//! answers per-target data and freshness queries for the HTTP layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheStore, Snapshot, TargetStatus};
use crate::config::{Config, Target};
use crate::fetch::{FetchError, Fetcher};
use crate::geo::{self, SchemaError};

/// Errors surfaced by the aggregation layer
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested target identifier is not in the registry
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// Upstream fetch failed and no usable cache existed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Upstream payload violated the expected container shape
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Every target failed during warm-up
    #[error("warm-up failed for all {0} targets")]
    WarmUpFailed(usize),

    /// Normalized collection could not be re-encoded as JSON
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-target snapshot handed to the HTTP layer
#[derive(Debug, Clone)]
pub struct ServedData {
    /// Raw payload, or the canonical feature collection for normalized targets
    pub body: Value,
    /// Timestamp for the `X-Last-Updated` response header
    pub last_updated: DateTime<Utc>,
}

/// Orchestrates CacheStore + Fetcher + geo normalization per target
pub struct AggregationService<F: Fetcher> {
    config: Config,
    store: CacheStore,
    fetcher: F,
}

impl<F: Fetcher> AggregationService<F> {
    /// Builds the service, creating the cache directory if needed
    pub fn new(config: Config, fetcher: F) -> std::io::Result<Self> {
        let store = CacheStore::new(config.cache_dir.clone(), &config.targets)?;
        Ok(Self {
            config,
            store,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Populates the cache for every target concurrently
    ///
    /// One slow or failing upstream never delays or fails the others.
    /// Partial failure is logged and startup proceeds; only a clean sweep
    /// of failures is an error, and even then the process may keep serving
    /// from artifacts already on disk.
    pub async fn warm_up(&self) -> Result<(), ServiceError> {
        info!("warming cache for {} targets", self.config.targets.len());

        let fetches = self
            .config
            .targets
            .iter()
            .map(|target| self.snapshot_for(target));
        let results = join_all(fetches).await;

        let mut warmed = 0;
        for (target, result) in self.config.targets.iter().zip(results) {
            match result {
                Ok(_) => warmed += 1,
                Err(err) => {
                    warn!(key = target.key, error = %err, "warm-up fetch failed");
                }
            }
        }

        if warmed == 0 {
            return Err(ServiceError::WarmUpFailed(self.config.targets.len()));
        }

        info!(
            warmed,
            total = self.config.targets.len(),
            "cache warm-up complete"
        );
        Ok(())
    }

    /// Serves a target's current data, normalized when the target requires it
    pub async fn fetch_for(&self, key: &str) -> Result<ServedData, ServiceError> {
        let target = self
            .config
            .target(key)
            .ok_or_else(|| ServiceError::UnknownTarget(key.to_string()))?;

        let snapshot = self.snapshot_for(target).await?;

        let body = if target.normalize {
            let collection = geo::normalize(&snapshot.data)?;
            serde_json::to_value(collection)?
        } else {
            snapshot.data
        };

        Ok(ServedData {
            body,
            last_updated: snapshot.last_updated,
        })
    }

    /// Reports every target's artifact status without touching the network
    pub async fn status_all(&self) -> BTreeMap<&'static str, TargetStatus> {
        let statuses = join_all(
            self.config
                .targets
                .iter()
                .map(|target| self.store.status_of(target)),
        )
        .await;

        self.config
            .targets
            .iter()
            .map(|t| t.key)
            .zip(statuses)
            .collect()
    }

    async fn snapshot_for(&self, target: &Target) -> Result<Snapshot, FetchError> {
        self.store
            .get_or_fetch(target, &self.fetcher, self.config.serve_stale_on_error)
            .await
    }
}
