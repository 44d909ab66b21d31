//! Background reaper: metadata expiration, lock GC and cache eviction.
//!
//! Each iteration sleeps for the configured wait interval and then runs
//! three phases in order:
//!
//! 1. Delete every node whose expiration is set, non-zero and in the past.
//! 2. Collect stale entries from the node, file and index lock registries.
//! 3. If cache mode is on, evict cached replicas that have not been read for
//!    at least the cache TTL *and* are held by a persistent location.
//!
//! Nothing in an iteration is fatal; failures are logged and the loop goes
//! on. A cached replica is never removed unless a persistent location for
//! the node has been confirmed.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tierkeep_common::config::{Config, LockGcConfig};
use tierkeep_common::{ExpirationQuery, LocationId, NodeId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::locks::LockPool;
use crate::ports::{CacheRegistry, LocationDirectory, LockRegistry, NodeStore};

/// Tunables for the reaper loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSettings {
    /// Sleep at the start of every iteration
    pub wait_interval: Duration,
    /// Minimum time since last access before a cached replica may be evicted
    pub cache_ttl: TimeDelta,
    /// Per-pool lock GC ages
    pub lock_gc: LockGcConfig,
}

impl ReaperSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let ttl_hours = i64::try_from(config.cache.ttl_hours).unwrap_or(i64::MAX);
        Self {
            wait_interval: config.reaper.wait_interval(),
            cache_ttl: TimeDelta::try_hours(ttl_hours).unwrap_or(TimeDelta::MAX),
            lock_gc: config.reaper.lock_gc,
        }
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Shared handles the reaper works against
pub struct ReaperDeps {
    pub nodes: Arc<dyn NodeStore>,
    pub lock_pools: Vec<(LockPool, Arc<dyn LockRegistry>)>,
    /// `None` when cache mode is off
    pub cache: Option<Arc<dyn CacheRegistry>>,
    pub locations: Arc<dyn LocationDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to one cached replica during phase 3
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Removed; `location` is the persistent location that holds the data
    Evicted { location: LocationId },
    /// Read too recently
    KeptTtlNotReached,
    /// Stale, but no persistent location confirmed
    KeptNoPersistentLocation,
    /// Stale, but the node record could not be loaded
    KeptLoadError,
}

/// Summary of one reaper iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub expired: usize,
    pub delete_failures: usize,
    pub locks_removed: usize,
    pub cache_scanned: bool,
    pub evicted: usize,
    pub kept_ttl_not_reached: usize,
    pub kept_no_persistent_location: usize,
    pub kept_load_error: usize,
}

impl IterationReport {
    fn record(&mut self, outcome: &EvictionOutcome) {
        match outcome {
            EvictionOutcome::Evicted { .. } => self.evicted += 1,
            EvictionOutcome::KeptTtlNotReached => self.kept_ttl_not_reached += 1,
            EvictionOutcome::KeptNoPersistentLocation => self.kept_no_persistent_location += 1,
            EvictionOutcome::KeptLoadError => self.kept_load_error += 1,
        }
    }
}

/// The reaper loop
pub struct Reaper {
    deps: ReaperDeps,
    settings: ReaperSettings,
}

impl Reaper {
    pub fn new(deps: ReaperDeps, settings: ReaperSettings) -> Self {
        Self { deps, settings }
    }

    pub const fn settings(&self) -> &ReaperSettings {
        &self.settings
    }

    /// Start the loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run iterations back to back, forever
    pub async fn run(self) {
        info!(
            "Reaper started (wait {}s, cache ttl {}h, cache mode {})",
            self.settings.wait_interval.as_secs(),
            self.settings.cache_ttl.num_hours(),
            if self.deps.cache.is_some() { "on" } else { "off" }
        );
        loop {
            let report = self.run_once().await;
            debug!(?report, "Reaper iteration finished");
        }
    }

    /// Sleep for the wait interval, then run the three phases
    pub async fn run_once(&self) -> IterationReport {
        self.deps.clock.sleep(self.settings.wait_interval).await;

        let mut report = IterationReport::default();

        let (expired, delete_failures) = self.expire_nodes(self.deps.clock.now()).await;
        report.expired = expired;
        report.delete_failures = delete_failures;

        report.locks_removed = self.collect_locks();

        if self.deps.cache.is_some() {
            report.cache_scanned = true;
            for outcome in self.evict_cache(self.deps.clock.now()).await {
                report.record(&outcome);
            }
        }

        report
    }

    /// Phase 1: delete expired nodes. Returns (deleted, failed).
    pub async fn expire_nodes(&self, now: DateTime<Utc>) -> (usize, usize) {
        let query = ExpirationQuery::new(now);
        let nodes = match self.deps.nodes.find_expired(&query).await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("Failed to query expired nodes: {}", e);
                return (0, 0);
            }
        };

        let mut deleted = 0;
        let mut failed = 0;
        for node in nodes {
            if !query.matches_node(&node) {
                warn!(
                    "Metadata store returned node {} that has not expired; skipping",
                    node.id
                );
                continue;
            }
            info!("Deleting expired node: {}", node.id);
            match self.deps.nodes.delete(&node.id).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    error!("Failed to delete expired node {}: {}", node.id, e);
                    failed += 1;
                }
            }
        }
        (deleted, failed)
    }

    /// Phase 2: age-based GC of every lock pool. Returns the total removed.
    pub fn collect_locks(&self) -> usize {
        let mut total = 0;
        for (pool, registry) in &self.deps.lock_pools {
            let removed = registry.remove_old(pool.max_age(&self.settings.lock_gc));
            if removed > 0 {
                debug!("Removed {} stale {} locks", removed, pool);
            }
            total += removed;
        }
        total
    }

    /// Phase 3: evaluate every cached replica. Empty when cache mode is off.
    pub async fn evict_cache(&self, now: DateTime<Utc>) -> Vec<EvictionOutcome> {
        let Some(cache) = &self.deps.cache else {
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        for (id, access) in cache.snapshot() {
            outcomes.push(self.evaluate_entry(cache.as_ref(), &id, access, now).await);
        }
        outcomes
    }

    /// Decide, and if allowed perform, the eviction of one cached replica
    pub async fn evaluate_entry(
        &self,
        cache: &dyn CacheRegistry,
        id: &NodeId,
        access: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EvictionOutcome {
        if now.signed_duration_since(access) < self.settings.cache_ttl {
            return EvictionOutcome::KeptTtlNotReached;
        }

        let node = match self.deps.nodes.load(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!("Cannot load cached node {}: {}", id, e);
                return EvictionOutcome::KeptLoadError;
            }
        };

        for location in &node.locations {
            let Some(desc) = self.deps.locations.lookup(location) else {
                error!(
                    "Location {} of node {} is not defined in this server instance",
                    location, id
                );
                continue;
            };
            if desc.persistent {
                info!(
                    "Node {} has persistent location {}, removing from cache",
                    id, location
                );
                cache.remove(id);
                return EvictionOutcome::Evicted {
                    location: location.clone(),
                };
            }
        }

        error!(
            "Cannot evict {} from cache: no persistent location (this should not happen)",
            id
        );
        EvictionOutcome::KeptNoPersistentLocation
    }
}
