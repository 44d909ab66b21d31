//! Configuration types for Tierkeep
//!
//! The binaries read a TOML file into [`Config`]; command line flags are
//! merged on top by the caller.

use crate::error::{Error, Result};
use crate::types::LocationDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default size of the in-memory record buffer used by the column indexer
pub const DEFAULT_INDEX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Root configuration for Tierkeep
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reaper scheduling and lock GC configuration
    pub reaper: ReaperConfig,
    /// Local cache configuration
    pub cache: CacheConfig,
    /// Column index configuration
    pub index: IndexConfig,
    /// Storage paths
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Known storage locations
    pub locations: Vec<LocationDescriptor>,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.reaper.wait_minutes == 0 {
            return Err(Error::configuration("reaper.wait_minutes must be at least 1"));
        }
        if self.index.chunk_size == 0 || self.index.chunk_size % 16 != 0 {
            return Err(Error::configuration(format!(
                "index.chunk_size must be a positive multiple of 16, got {}",
                self.index.chunk_size
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for loc in &self.locations {
            if loc.id.as_str().is_empty() {
                return Err(Error::configuration("location with empty id"));
            }
            if !seen.insert(loc.id.clone()) {
                return Err(Error::configuration(format!("duplicate location id {}", loc.id)));
            }
        }
        Ok(())
    }

    /// Directory for temporary index files (defaults to `<data_dir>/temp`)
    #[must_use]
    pub fn index_temp_dir(&self) -> PathBuf {
        self.index
            .temp_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("temp"))
    }

    /// Path of the node metadata database
    #[must_use]
    pub fn node_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("nodes.redb")
    }
}

/// Reaper configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Sleep between reaper iterations (minutes)
    pub wait_minutes: u64,
    /// Lock registry GC ages
    pub lock_gc: LockGcConfig,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            wait_minutes: 60,
            lock_gc: LockGcConfig::default(),
        }
    }
}

impl ReaperConfig {
    #[must_use]
    pub const fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_minutes * 60)
    }
}

/// Maximum age, in hours, of entries in each lock registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockGcConfig {
    pub node_hours: u64,
    pub file_hours: u64,
    pub index_hours: u64,
}

impl Default for LockGcConfig {
    fn default() -> Self {
        Self {
            node_hours: 1,
            file_hours: 6,
            index_hours: 6,
        }
    }
}

/// Local cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; unset or empty disables cache mode
    pub path: Option<PathBuf>,
    /// Hours since last access before a cached file becomes eligible for eviction
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_hours: 24,
        }
    }
}

impl CacheConfig {
    /// The cache directory, if cache mode is enabled
    #[must_use]
    pub fn enabled_path(&self) -> Option<&Path> {
        self.path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Column index configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Where temporary index files are built before the final rename
    pub temp_dir: Option<PathBuf>,
    /// Record buffer size in bytes (multiple of 16)
    pub chunk_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            chunk_size: DEFAULT_INDEX_CHUNK_SIZE,
        }
    }
}

/// Storage paths
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory holding the node database and temp files
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tierkeep-data"),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reaper.wait_minutes, 60);
        assert_eq!(config.reaper.lock_gc, LockGcConfig::default());
        assert_eq!(config.reaper.lock_gc.node_hours, 1);
        assert_eq!(config.reaper.lock_gc.file_hours, 6);
        assert_eq!(config.cache.ttl_hours, 24);
        assert!(config.cache.enabled_path().is_none());
        assert_eq!(config.index.chunk_size, 16 * 1024 * 1024);
        assert_eq!(config.index_temp_dir(), PathBuf::from("./tierkeep-data/temp"));
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(
            r#"
            [reaper]
            wait_minutes = 5

            [reaper.lock_gc]
            file_hours = 12

            [cache]
            path = "/var/cache/tierkeep"
            ttl_hours = 48

            [[locations]]
            id = "s3"
            kind = "S3"
            persistent = true
            tier = 5

            [[locations]]
            id = "scratch"
            "#,
        )
        .unwrap();

        assert_eq!(config.reaper.wait_interval(), Duration::from_secs(300));
        assert_eq!(config.reaper.lock_gc.node_hours, 1);
        assert_eq!(config.reaper.lock_gc.file_hours, 12);
        assert_eq!(
            config.cache.enabled_path(),
            Some(Path::new("/var/cache/tierkeep"))
        );
        assert_eq!(config.locations.len(), 2);
        assert!(config.locations[0].persistent);
        assert!(!config.locations[1].persistent);
    }

    #[test]
    fn test_empty_cache_path_disables_cache() {
        let config = Config::from_toml_str("[cache]\npath = \"\"\n").unwrap();
        assert!(config.cache.enabled_path().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::from_toml_str("[index]\nchunk_size = 100\n").is_err());
        assert!(Config::from_toml_str("[reaper]\nwait_minutes = 0\n").is_err());
        assert!(
            Config::from_toml_str("[[locations]]\nid = \"a\"\n[[locations]]\nid = \"a\"\n")
                .is_err()
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.reaper.wait_minutes, 60);
    }
}
