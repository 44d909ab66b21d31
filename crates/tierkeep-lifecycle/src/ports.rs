//! Contracts the reaper consumes.
//!
//! The metadata store, the lock registries, the cache registry and the
//! location directory are owned by the rest of the process; the reaper only
//! sees them through these traits so it can run against fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tierkeep_common::{ExpirationQuery, LocationDescriptor, LocationId, Node, NodeId, Result};

/// Node metadata store
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// All nodes selected by the expiration query
    async fn find_expired(&self, query: &ExpirationQuery) -> Result<Vec<Node>>;

    /// Delete a node record
    async fn delete(&self, id: &NodeId) -> Result<()>;

    /// Load a full node record
    async fn load(&self, id: &NodeId) -> Result<Node>;
}

/// Time-stamped registry of in-flight operations
pub trait LockRegistry: Send + Sync {
    /// Drop entries older than `max_age`; returns how many were removed
    fn remove_old(&self, max_age: TimeDelta) -> usize;
}

/// Locally cached replicas and their last access time
pub trait CacheRegistry: Send + Sync {
    /// Point-in-time copy of every cached id with its last access
    fn snapshot(&self) -> Vec<(NodeId, DateTime<Utc>)>;

    /// Remove a cached replica; returns false if it was not cached
    fn remove(&self, id: &NodeId) -> bool;
}

/// Read-only mapping from location id to descriptor
pub trait LocationDirectory: Send + Sync {
    fn lookup(&self, id: &LocationId) -> Option<&LocationDescriptor>;
}
