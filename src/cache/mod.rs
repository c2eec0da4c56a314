//! File-backed cache for upstream sensor payloads
//!
//! One JSON artifact per target, freshness decided solely from the
//! artifact's modification time against the target's TTL. The store
//! implements get-or-fetch semantics: a fresh artifact is served without
//! touching the network, anything else delegates to the upstream fetcher
//! and persists the result.

mod store;

pub use store::{CacheStore, Snapshot, TargetStatus};
