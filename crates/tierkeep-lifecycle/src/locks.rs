//! In-process lock registries for node, file and index operations.
//!
//! API handlers take a lock on an id while an upload, a file copy or an index
//! build is in flight. Entries left behind by crashed or abandoned requests
//! are collected by age in the reaper's lock GC phase.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tierkeep_common::config::LockGcConfig;
use tierkeep_common::{Error, Result};

use crate::clock::Clock;
use crate::ports::LockRegistry;

/// The three independently aged lock pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockPool {
    Node,
    File,
    Index,
}

impl LockPool {
    pub const ALL: [Self; 3] = [Self::Node, Self::File, Self::Index];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::File => "file",
            Self::Index => "index",
        }
    }

    /// GC age configured for this pool
    #[must_use]
    pub fn max_age(&self, gc: &LockGcConfig) -> TimeDelta {
        let hours = match self {
            Self::Node => gc.node_hours,
            Self::File => gc.file_hours,
            Self::Index => gc.index_hours,
        };
        TimeDelta::try_hours(i64::try_from(hours).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
    }
}

impl fmt::Display for LockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockEntry {
    pub created: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
}

/// One lock pool keyed by id
pub struct LockManager {
    pool: LockPool,
    entries: RwLock<HashMap<String, LockEntry>>,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(pool: LockPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    #[must_use]
    pub const fn pool(&self) -> LockPool {
        self.pool
    }

    /// Take the lock for `id`; fails if it is already held
    pub fn acquire(&self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        if entries.contains_key(id) {
            return Err(Error::Locked {
                kind: self.pool.as_str(),
                id: id.to_string(),
            });
        }
        entries.insert(
            id.to_string(),
            LockEntry {
                created: now,
                last_touch: now,
            },
        );
        Ok(())
    }

    /// Release the lock for `id`
    pub fn release(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    /// Refresh a long-running holder so GC does not collect it
    pub fn touch(&self, id: &str) -> bool {
        let now = self.clock.now();
        match self.entries.write().get_mut(id) {
            Some(entry) => {
                entry.last_touch = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<LockEntry> {
        self.entries.read().get(id).copied()
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LockRegistry for LockManager {
    fn remove_old(&self, max_age: TimeDelta) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.signed_duration_since(entry.last_touch) <= max_age);
        before - entries.len()
    }
}

/// The node, file and index pools shared by the API layer and the reaper
pub struct LockRegistries {
    pub node: Arc<LockManager>,
    pub file: Arc<LockManager>,
    pub index: Arc<LockManager>,
}

impl LockRegistries {
    pub fn new(clock: &Arc<dyn Clock>) -> Self {
        Self {
            node: Arc::new(LockManager::new(LockPool::Node, Arc::clone(clock))),
            file: Arc::new(LockManager::new(LockPool::File, Arc::clone(clock))),
            index: Arc::new(LockManager::new(LockPool::Index, Arc::clone(clock))),
        }
    }

    #[must_use]
    pub fn get(&self, pool: LockPool) -> &Arc<LockManager> {
        match pool {
            LockPool::Node => &self.node,
            LockPool::File => &self.file,
            LockPool::Index => &self.index,
        }
    }

    /// The pools as reaper collaborators
    #[must_use]
    pub fn pools(&self) -> Vec<(LockPool, Arc<dyn LockRegistry>)> {
        LockPool::ALL
            .iter()
            .map(|pool| {
                let registry: Arc<dyn LockRegistry> = self.get(*pool).clone();
                (*pool, registry)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_acquire_release() {
        let clock = manual_clock();
        let locks = LockManager::new(LockPool::Node, clock);

        locks.acquire("n1").unwrap();
        assert!(locks.is_locked("n1"));
        assert!(matches!(
            locks.acquire("n1"),
            Err(Error::Locked { kind: "node", .. })
        ));

        assert!(locks.release("n1"));
        assert!(!locks.release("n1"));
        locks.acquire("n1").unwrap();
    }

    #[test]
    fn test_remove_old_keeps_newer_entries() {
        let clock = manual_clock();
        let locks = LockManager::new(LockPool::Node, clock.clone());

        locks.acquire("old-a").unwrap();
        locks.acquire("old-b").unwrap();
        clock.advance(TimeDelta::minutes(30));
        locks.acquire("young").unwrap();
        clock.advance(TimeDelta::minutes(45));

        // old-a/old-b are 75 minutes old, young is 45 minutes old
        let removed = locks.remove_old(TimeDelta::hours(1));
        assert_eq!(removed, 2);
        assert!(!locks.is_locked("old-a"));
        assert!(!locks.is_locked("old-b"));
        assert!(locks.is_locked("young"));
    }

    #[test]
    fn test_touch_resets_age() {
        let clock = manual_clock();
        let locks = LockManager::new(LockPool::File, clock.clone());

        locks.acquire("f1").unwrap();
        clock.advance(TimeDelta::hours(5));
        assert!(locks.touch("f1"));
        clock.advance(TimeDelta::hours(5));

        assert_eq!(locks.remove_old(TimeDelta::hours(6)), 0);
        let entry = locks.get("f1").unwrap();
        assert_eq!(entry.last_touch - entry.created, TimeDelta::hours(5));
        assert!(!locks.touch("missing"));
    }

    #[test]
    fn test_pool_thresholds_from_config() {
        let gc = LockGcConfig::default();
        assert_eq!(LockPool::Node.max_age(&gc), TimeDelta::hours(1));
        assert_eq!(LockPool::File.max_age(&gc), TimeDelta::hours(6));
        assert_eq!(LockPool::Index.max_age(&gc), TimeDelta::hours(6));
    }

    #[test]
    fn test_registries_gc_independently() {
        let clock = manual_clock();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let registries = LockRegistries::new(&dyn_clock);
        let gc = LockGcConfig::default();

        registries.node.acquire("n").unwrap();
        registries.file.acquire("f").unwrap();
        registries.index.acquire("i").unwrap();
        clock.advance(TimeDelta::hours(2));

        for (pool, registry) in registries.pools() {
            registry.remove_old(pool.max_age(&gc));
        }

        assert!(registries.node.is_empty());
        assert!(registries.file.is_locked("f"));
        assert!(registries.index.is_locked("i"));

        clock.advance(TimeDelta::hours(5));
        for (pool, registry) in registries.pools() {
            registry.remove_old(pool.max_age(&gc));
        }
        assert!(registries.file.is_empty());
        assert!(registries.index.is_empty());
    }
}
