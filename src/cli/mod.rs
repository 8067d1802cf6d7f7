use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::Result,
    logger::LogLevel,
    persistance::{snapshot::SnapshotCreator, unix_millis},
    storage::storage::ExpiringCache,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub subcommand: Runtime,

    /// JSON config file. Flags below override its values.
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(long, global = true)]
    pub snapshot: Option<PathBuf>,

    #[arg(long, global = true)]
    pub snapshot_interval: Option<u64>,

    #[arg(long, global = true)]
    pub sweep_interval: Option<u64>,

    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Subcommand)]
pub enum Runtime {
    /// Keep a cache alive with sweeping and snapshots until Ctrl-C.
    Run,
    /// Drive a random Set/Get/Delete workload against a cache.
    Demo {
        #[arg(long, default_value_t = 1000)]
        iterations: u64,
        #[arg(long, default_value_t = 16)]
        keys: u32,
        #[arg(long, default_value_t = 500)]
        ttl_ms: u64,
        #[arg(long, default_value_t = 1)]
        pause_ms: u64,
    },
    /// Print the records of a snapshot file as JSON.
    Inspect { file: PathBuf },
}

impl Args {
    /// Loads the config file, if any, and applies the command line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(path) = &self.snapshot {
            config.snapshot.path = Some(path.clone());
        }
        if let Some(secs) = self.snapshot_interval {
            config.snapshot.interval_secs = secs;
        }
        if let Some(secs) = self.sweep_interval {
            config.cache.sweep_interval_secs = secs;
        }
        if let Some(dir) = &self.log_dir {
            config.log.path = dir.clone();
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DemoStats {
    pub sets: u64,
    pub hits: u64,
    pub misses: u64,
    pub deletes: u64,
}

/// Random workload over `keys` keys. Values are `"<key>:<n>"` so a hit can be
/// checked against the key it was read from.
pub async fn run_demo(
    cache: &ExpiringCache<String>,
    iterations: u64,
    keys: u32,
    ttl: Duration,
    pause: Duration,
) -> DemoStats {
    let mut rng = StdRng::from_entropy();
    let mut stats = DemoStats::default();

    for i in 0..iterations {
        let key = format!("key-{}", rng.gen_range(0..keys.max(1)));
        match rng.gen_range(0..10) {
            0..=3 => {
                cache.set(&key, format!("{key}:{i}"), ttl);
                stats.sets += 1;
            }
            4..=8 => match cache.get(&key) {
                Some(value) => {
                    debug_assert!(value.starts_with(&format!("{key}:")));
                    stats.hits += 1;
                }
                None => stats.misses += 1,
            },
            _ => {
                cache.delete(&key);
                stats.deletes += 1;
            }
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        if i > 0 && i % 100 == 0 {
            debug!(i, live = cache.keys().len(), "demo progress");
        }
    }

    info!(?stats, "demo finished");
    stats
}

/// Renders every record of a snapshot, with an `expired` flag, as JSON.
pub async fn inspect(file: PathBuf) -> Result<String> {
    let records = SnapshotCreator::new(file)
        .read_all::<serde_json::Value>()
        .await?;
    let now_ms = unix_millis(SystemTime::now());
    let rendered: Vec<_> = records
        .into_iter()
        .map(|r| {
            json!({
                "key": r.key,
                "value": r.value,
                "expires_at_ms": r.expires_at_ms,
                "expired": r.is_expired_at(now_ms),
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rendered)?)
}
