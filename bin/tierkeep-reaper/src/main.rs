//! Tierkeep Reaper - background expiration and eviction daemon
//!
//! Loads the TOML config, wires the node store, lock registries, cache
//! registry and location map together and runs the reaper loop until
//! interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tierkeep_common::Config;
use tierkeep_lifecycle::{
    CacheMap, CacheRegistry, Clock, LocationMap, LockRegistries, RedbNodeStore, Reaper,
    ReaperDeps, ReaperSettings, SystemClock,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tierkeep-reaper")]
#[command(about = "Tierkeep expiration and cache eviction daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/tierkeep/tierkeep.toml")]
    config: PathBuf,

    /// Log level (overrides [logging] level)
    #[arg(long)]
    log_level: Option<String>,

    /// Local cache directory; enables cache eviction
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Data directory holding the node store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Minutes to wait between iterations
    #[arg(long)]
    wait_minutes: Option<u64>,
}

impl Args {
    /// Apply command line overrides on top of the file config
    fn merge_into(self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(dir) = self.cache_dir {
            config.cache.path = Some(dir);
        }
        if let Some(dir) = self.data_dir {
            config.storage.data_dir = dir;
        }
        if let Some(minutes) = self.wait_minutes {
            config.reaper.wait_minutes = minutes;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config_path = args.config.clone();

    // Load config file if it exists, CLI takes precedence
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    args.merge_into(&mut config);
    config.validate().context("invalid configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tierkeep reaper");
    info!("Config file: {}", config_path.display());
    info!("Data directory: {}", config.storage.data_dir.display());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let node_db = config.node_db_path();
    let nodes = RedbNodeStore::open(&node_db)
        .with_context(|| format!("failed to open node store {}", node_db.display()))?;

    let locks = LockRegistries::new(&clock);

    let cache = match config.cache.enabled_path() {
        Some(path) => {
            let map = CacheMap::load(path, Arc::clone(&clock))
                .with_context(|| format!("failed to load cache directory {}", path.display()))?;
            info!("Cache mode on: {} ({} entries)", path.display(), map.len());
            Some(Arc::new(map) as Arc<dyn CacheRegistry>)
        }
        None => {
            info!("Cache mode off");
            None
        }
    };

    let locations = LocationMap::new(config.locations.iter().cloned());
    info!("Locations: {} configured", locations.len());
    if cache.is_some() && locations.persistent_ids().is_empty() {
        warn!("Cache mode is on but no persistent location is configured; nothing will be evicted");
    }

    let deps = ReaperDeps {
        nodes: Arc::new(nodes),
        lock_pools: locks.pools(),
        cache,
        locations: Arc::new(locations),
        clock,
    };
    let mut handle = Reaper::new(deps, ReaperSettings::from_config(&config)).spawn();

    tokio::select! {
        result = &mut handle => {
            match result {
                Ok(()) => warn!("Reaper loop exited"),
                Err(e) => {
                    error!("Reaper task failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            handle.abort();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file_values() {
        let mut config = Config::from_toml_str(
            "[reaper]\nwait_minutes = 30\n[storage]\ndata_dir = \"/srv/a\"\n",
        )
        .unwrap();
        let args = Args::parse_from([
            "tierkeep-reaper",
            "--data-dir",
            "/srv/b",
            "--cache-dir",
            "/var/cache/tierkeep",
            "--log-level",
            "debug",
        ]);
        args.merge_into(&mut config);

        assert_eq!(config.reaper.wait_minutes, 30);
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/b"));
        assert_eq!(
            config.cache.enabled_path(),
            Some(std::path::Path::new("/var/cache/tierkeep"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_wait_minutes_override() {
        let mut config = Config::default();
        Args::parse_from(["tierkeep-reaper", "--wait-minutes", "5"]).merge_into(&mut config);
        assert_eq!(config.reaper.wait_minutes, 5);
        assert!(config.cache.enabled_path().is_none());
    }
}
