//! Process-wide logging.
//!
//! [`init`] installs one global `tracing` subscriber that writes to stdout and
//! to a rolling file. It can succeed only once per process; later calls return
//! [`crate::error::CacheError::LoggerInstall`].

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::Result;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOG_SUFFIX: &str = "log";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Verbosity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// How often a new log file is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// File name prefix: `<name>.<date>.log`.
    pub name: String,
    /// Directory holding the log files.
    pub path: PathBuf,
    /// Total size budget of the log directory in megabytes. 0 disables it.
    pub max_size_mb: u64,
    /// Rotated files kept next to the active one. 0 keeps all.
    pub max_backups: usize,
    /// Files not written for this many days are removed. 0 keeps all.
    pub max_age_days: u64,
    pub level: LogLevel,
    pub rotation: LogRotation,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            path: PathBuf::from("logs"),
            max_size_mb: 100,
            max_backups: 30,
            max_age_days: 1,
            level: LogLevel::Debug,
            rotation: LogRotation::Daily,
        }
    }
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggerGuard {
    _file: WorkerGuard,
}

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` directives, when set, refine the configured level.
pub fn init(config: &LogConfig) -> Result<LoggerGuard> {
    fs::create_dir_all(&config.path)?;
    let pruned = prune(config)?;

    let mut builder = RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(config.name.clone())
        .filename_suffix(LOG_SUFFIX);
    if config.max_backups > 0 {
        builder = builder.max_log_files(config.max_backups + 1);
    }
    let appender = builder.build(&config.path)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .from_env_lossy();

    let console = fmt::layer()
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file = fmt::layer()
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::debug!(dir = %config.path.display(), pruned, "logger initialized");
    Ok(LoggerGuard { _file: guard })
}

struct LogFile {
    path: PathBuf,
    modified: SystemTime,
    len: u64,
}

/// Log files belonging to `config.name`, newest first.
fn log_files(config: &LogConfig) -> Result<Vec<LogFile>> {
    let prefix = format!("{}.", config.name);
    let suffix = format!(".{LOG_SUFFIX}");
    let mut files = Vec::new();

    for entry in fs::read_dir(&config.path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(&suffix) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        files.push(LogFile {
            path: entry.path(),
            modified: meta.modified()?,
            len: meta.len(),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(files)
}

/// Applies the age and size retention rules to existing log files.
///
/// The newest file is never removed for size reasons, only for age.
/// Returns the number of files deleted.
pub fn prune(config: &LogConfig) -> Result<usize> {
    if !config.path.is_dir() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let max_age = Duration::from_secs(config.max_age_days.saturating_mul(SECS_PER_DAY));
    let mut removed = 0;
    let mut kept = Vec::new();

    for file in log_files(config)? {
        let age = now.duration_since(file.modified).unwrap_or_default();
        if config.max_age_days > 0 && age > max_age {
            remove(&file.path)?;
            removed += 1;
        } else {
            kept.push(file);
        }
    }

    if config.max_size_mb > 0 {
        let budget = config.max_size_mb.saturating_mul(1024 * 1024);
        let mut total: u64 = kept.iter().map(|f| f.len).sum();
        while total > budget && kept.len() > 1 {
            if let Some(oldest) = kept.pop() {
                remove(&oldest.path)?;
                total -= oldest.len;
                removed += 1;
            }
        }
    }

    Ok(removed)
}

fn remove(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> LogConfig {
        LogConfig {
            name: "app".to_string(),
            path: dir.to_path_buf(),
            max_size_mb: 0,
            max_backups: 0,
            max_age_days: 0,
            ..LogConfig::default()
        }
    }

    fn write_log(dir: &Path, name: &str, len: usize, age: Duration) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; len]).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.path, PathBuf::from("logs"));
        assert_eq!(config.max_size_mb, 100);
        assert_eq!(config.max_backups, 30);
        assert_eq!(config.max_age_days, 1);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }

    #[test]
    fn test_prune_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir.path().join("absent"));
        assert_eq!(prune(&config).unwrap(), 0);
    }

    #[test]
    fn test_prune_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let day = Duration::from_secs(SECS_PER_DAY);
        let old = write_log(dir.path(), "app.2020-01-01.log", 10, day * 3);
        let fresh = write_log(dir.path(), "app.2020-01-04.log", 10, Duration::ZERO);

        let config = LogConfig {
            max_age_days: 1,
            ..config_in(dir.path())
        };
        assert_eq!(prune(&config).unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_prune_by_size_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mb = 1024 * 1024;
        let oldest = write_log(dir.path(), "app.1.log", mb, Duration::from_secs(300));
        let middle = write_log(dir.path(), "app.2.log", mb, Duration::from_secs(200));
        let newest = write_log(dir.path(), "app.3.log", mb, Duration::from_secs(100));

        let config = LogConfig {
            max_size_mb: 2,
            ..config_in(dir.path())
        };
        assert_eq!(prune(&config).unwrap(), 1);
        assert!(!oldest.exists());
        assert!(middle.exists());
        assert!(newest.exists());

        let config = LogConfig {
            max_size_mb: 0,
            ..config
        };
        assert_eq!(prune(&config).unwrap(), 0);
    }

    #[test]
    fn test_prune_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let day = Duration::from_secs(SECS_PER_DAY);
        let other = write_log(dir.path(), "other.2020-01-01.log", 10, day * 10);
        let notes = write_log(dir.path(), "app.notes.txt", 10, day * 10);

        let config = LogConfig {
            max_age_days: 1,
            ..config_in(dir.path())
        };
        assert_eq!(prune(&config).unwrap(), 0);
        assert!(other.exists());
        assert!(notes.exists());
    }
}
