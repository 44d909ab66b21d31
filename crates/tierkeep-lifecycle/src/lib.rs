//! Tierkeep Lifecycle - expiration and eviction engine
//!
//! This crate implements the background reaper and the collaborators it
//! works against:
//! - Metadata expiration (nodes past their TTL are deleted)
//! - Age-based garbage collection of the node, file and index lock registries
//! - Eviction of locally cached replicas that are stale and held by at least
//!   one persistent location
//! - A redb-backed node store, an in-process cache registry and lock manager

pub mod cache;
pub mod clock;
pub mod locations;
pub mod locks;
pub mod node_store;
pub mod ports;
pub mod reaper;

// Re-exports
pub use cache::{CacheEntry, CacheMap};
pub use clock::{Clock, ManualClock, SystemClock};
pub use locations::LocationMap;
pub use locks::{LockEntry, LockManager, LockPool, LockRegistries};
pub use node_store::{NodeStoreError, RedbNodeStore};
pub use ports::{CacheRegistry, LocationDirectory, LockRegistry, NodeStore};
pub use reaper::{EvictionOutcome, IterationReport, Reaper, ReaperDeps, ReaperSettings};
