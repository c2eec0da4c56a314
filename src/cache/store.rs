//! Cache store with TTL-by-modification-time and single-flight refetch

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Target;
use crate::fetch::{FetchError, Fetcher};

/// In-memory result of a cache lookup or refetch
///
/// `last_updated` is the artifact's modification time on a cache hit, or
/// the fetch time on a refetch — never the old file time, and never a
/// timestamp embedded in the payload itself.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Raw upstream payload
    pub data: Value,
    /// When the served data was obtained
    pub last_updated: DateTime<Utc>,
    /// Whether the payload came from the artifact rather than the network
    pub from_cache: bool,
}

/// Artifact presence and age for one target, computed on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// Artifact modification time as epoch milliseconds, 0 when absent
    pub last_updated: i64,
    /// Whether an artifact has ever been written for the target
    pub exists: bool,
}

/// File-backed store holding one JSON artifact per target
///
/// Per-target operations never contend: each target owns its own file and
/// its own refetch mutex. The mutex collapses concurrent cache misses for
/// one target into a single upstream call. It guards a slot holding the
/// winner's in-memory snapshot, so losers reuse that result directly; the
/// artifact on disk cannot be re-checked instead, because the winner's
/// write is still in flight when the lock is released.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    locks: HashMap<&'static str, Mutex<Option<Snapshot>>>,
}

impl CacheStore {
    /// Creates a store rooted at `cache_dir`, creating the directory if needed
    pub fn new(cache_dir: PathBuf, targets: &[Target]) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        let locks = targets.iter().map(|t| (t.key, Mutex::new(None))).collect();
        Ok(Self { cache_dir, locks })
    }

    /// Returns the path of a target's cache artifact
    pub fn artifact_path(&self, target: &Target) -> PathBuf {
        self.cache_dir.join(target.cache_file)
    }

    /// Serves a target's snapshot, refetching from upstream when stale
    ///
    /// The common fresh-artifact case touches no network. On a miss the
    /// fresh payload is returned immediately while the artifact write
    /// completes in the background; write failures are logged and never
    /// surface here. With `stale_on_error` set, a failed refetch falls back
    /// to a stale-but-present artifact instead of propagating the error.
    pub async fn get_or_fetch<F>(
        &self,
        target: &Target,
        fetcher: &F,
        stale_on_error: bool,
    ) -> Result<Snapshot, FetchError>
    where
        F: Fetcher + ?Sized,
    {
        if let Some(snapshot) = self.read_fresh(target).await {
            return Ok(snapshot);
        }

        // Single-flight: at most one refetch-and-persist per target at a time
        let mut slot = match self.locks.get(target.key) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        // A loser of the refetch race reuses the winner's in-memory result;
        // the artifact may not have landed on disk yet
        if let Some(Some(snapshot)) = slot.as_deref() {
            let age = Utc::now().signed_duration_since(snapshot.last_updated);
            if age < Duration::milliseconds(ttl_millis(target)) {
                debug!(key = target.key, "reusing result from a concurrent refetch");
                return Ok(snapshot.clone());
            }
        }
        if let Some(snapshot) = self.read_fresh(target).await {
            return Ok(snapshot);
        }

        match fetcher.fetch(&target.endpoint).await {
            Ok(data) => {
                self.persist_in_background(target, &data);
                let snapshot = Snapshot {
                    data,
                    last_updated: Utc::now(),
                    from_cache: false,
                };
                if let Some(guard) = slot.as_deref_mut() {
                    *guard = Some(snapshot.clone());
                }
                Ok(snapshot)
            }
            Err(err) => {
                if stale_on_error {
                    if let Some((data, modified)) = self.read_artifact(target).await {
                        warn!(
                            key = target.key,
                            error = %err,
                            "upstream failed, serving stale artifact"
                        );
                        return Ok(Snapshot {
                            data,
                            last_updated: modified,
                            from_cache: true,
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// Reports artifact existence and modification time without fetching
    pub async fn status_of(&self, target: &Target) -> TargetStatus {
        match fs::metadata(self.artifact_path(target)).await {
            Ok(metadata) => {
                let last_updated = metadata
                    .modified()
                    .map(|m| DateTime::<Utc>::from(m).timestamp_millis())
                    .unwrap_or(0);
                TargetStatus {
                    last_updated,
                    exists: true,
                }
            }
            Err(_) => TargetStatus {
                last_updated: 0,
                exists: false,
            },
        }
    }

    /// Returns the artifact as a snapshot if it is younger than the TTL
    async fn read_fresh(&self, target: &Target) -> Option<Snapshot> {
        let modified = self.modified_time(target).await?;
        let age = Utc::now().signed_duration_since(modified);

        if age >= Duration::milliseconds(ttl_millis(target)) {
            info!(
                key = target.key,
                age_ms = age.num_milliseconds(),
                "cache expired, refreshing"
            );
            return None;
        }

        let (data, _) = self.read_artifact(target).await?;
        debug!(
            key = target.key,
            age_ms = age.num_milliseconds(),
            "cache hit"
        );
        Some(Snapshot {
            data,
            last_updated: modified,
            from_cache: true,
        })
    }

    /// Modification time of the artifact, logging anything but a clean miss
    async fn modified_time(&self, target: &Target) -> Option<DateTime<Utc>> {
        match fs::metadata(self.artifact_path(target)).await {
            Ok(metadata) => metadata.modified().ok().map(DateTime::<Utc>::from),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(key = target.key, "cache miss, fetching from upstream");
                None
            }
            Err(err) => {
                warn!(key = target.key, error = %err, "cache artifact unreadable");
                None
            }
        }
    }

    /// Reads and parses the artifact regardless of age
    ///
    /// A corrupt artifact is logged and treated exactly like a missing one;
    /// it is never a fatal error.
    async fn read_artifact(&self, target: &Target) -> Option<(Value, DateTime<Utc>)> {
        let path = self.artifact_path(target);
        let metadata = fs::metadata(&path).await.ok()?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) => {
                warn!(key = target.key, error = %err, "cache artifact unreadable");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(data) => Some((data, modified)),
            Err(err) => {
                warn!(key = target.key, error = %err, "cache artifact corrupt, refetching");
                None
            }
        }
    }

    /// Writes the artifact without blocking the caller's response
    fn persist_in_background(&self, target: &Target, data: &Value) {
        let path = self.artifact_path(target);
        let key = target.key;

        let json = match serde_json::to_string_pretty(data) {
            Ok(json) => json,
            Err(err) => {
                error!(key, error = %err, "failed to serialize cache artifact");
                return;
            }
        };

        tokio::spawn(async move {
            match fs::write(&path, json).await {
                Ok(()) => info!(key, "cache artifact updated"),
                Err(err) => error!(key, error = %err, "failed to write cache artifact"),
            }
        });
    }
}

/// TTL as a signed millisecond count; values beyond `i64::MAX` saturate
/// instead of wrapping into "always stale"
fn ttl_millis(target: &Target) -> i64 {
    i64::try_from(target.ttl_ms).unwrap_or(i64::MAX)
}
