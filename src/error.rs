use std::io;

use thiserror::Error;

/// Errors raised at the edges of the cache: persistence, configuration and
/// logger setup. Set/Get/Delete themselves never fail.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode snapshot record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode snapshot record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("snapshot record of {0} bytes exceeds the record size limit")]
    RecordTooLarge(u64),

    #[error("failed to open log file: {0}")]
    LogAppender(#[from] tracing_appender::rolling::InitError),

    #[error("global logger already installed: {0}")]
    LoggerInstall(#[from] tracing_subscriber::util::TryInitError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
