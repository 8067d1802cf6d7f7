use std::{
    io::{self, ErrorKind},
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{CacheError, Result},
    storage::Cache,
};

pub mod snapshot;

/// Larger length prefixes are treated as corruption.
pub const MAX_RECORD_LEN: u64 = 64 * 1024 * 1024;

#[async_trait]
pub trait Persistent<V>: Cache<V> {
    async fn save_to_file(&self, path: &Path) -> Result<u64>;

    /// A missing file restores nothing.
    async fn load_from_file(&self, path: &Path) -> Result<u64>;
}

/// Expiration is wall-clock UNIX time in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord<V> {
    pub key: String,
    pub value: V,
    pub expires_at_ms: u64,
}

impl<V> SnapshotRecord<V> {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }

    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(now_ms))
    }
}

pub fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Appends `record` as a big-endian `u64` length followed by MessagePack.
pub async fn write_record<W, V>(w: &mut W, record: &SnapshotRecord<V>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    V: Serialize,
{
    let buf = rmp_serde::to_vec_named(record)?;
    w.write_all(&(buf.len() as u64).to_be_bytes()).await?;
    w.write_all(&buf).await?;
    Ok(())
}

/// Reads the next record, or `None` at end of file.
pub async fn read_record<R, V>(r: &mut R) -> Result<Option<SnapshotRecord<V>>>
where
    R: AsyncRead + Unpin,
    V: DeserializeOwned,
{
    let mut len_buf = [0u8; 8];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = r.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    match filled {
        0 => return Ok(None),
        8 => {}
        n => {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("snapshot ends inside a record length ({n} of 8 bytes)"),
            )
            .into())
        }
    }

    let size = u64::from_be_bytes(len_buf);
    if size == 0 {
        return Ok(None);
    }
    if size > MAX_RECORD_LEN {
        return Err(CacheError::RecordTooLarge(size));
    }

    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf).await?;
    Ok(Some(rmp_serde::from_slice(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_expiry_is_strict() {
        let record = SnapshotRecord {
            key: "k".to_string(),
            value: 1u8,
            expires_at_ms: 1_000,
        };
        assert!(!record.is_expired_at(1_000));
        assert!(record.is_expired_at(1_001));
        assert_eq!(record.remaining(400), Duration::from_millis(600));
        assert_eq!(record.remaining(5_000), Duration::ZERO);
    }

    #[test]
    fn test_unix_millis_before_epoch() {
        let t = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(unix_millis(t), 0);
        assert_eq!(unix_millis(UNIX_EPOCH + Duration::from_millis(42)), 42);
    }

    #[tokio::test]
    async fn test_read_until_eof() {
        let mut buf = Vec::new();
        for (key, value) in [("a", 1u32), ("b", 2u32)] {
            let record = SnapshotRecord {
                key: key.to_string(),
                value,
                expires_at_ms: 10,
            };
            write_record(&mut buf, &record).await.unwrap();
        }

        let mut reader = buf.as_slice();
        let first: SnapshotRecord<u32> = read_record(&mut reader).await.unwrap().unwrap();
        let second: SnapshotRecord<u32> = read_record(&mut reader).await.unwrap().unwrap();
        assert_eq!((first.key.as_str(), first.value), ("a", 1));
        assert_eq!((second.key.as_str(), second.value), ("b", 2));
        assert!(read_record::<_, u32>(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let buf = u64::MAX.to_be_bytes();
        let mut reader = &buf[..];
        let err = read_record::<_, u32>(&mut reader).await.unwrap_err();
        assert!(matches!(err, CacheError::RecordTooLarge(u64::MAX)));
    }

    #[tokio::test]
    async fn test_truncated_length_is_an_error() {
        let record = SnapshotRecord {
            key: "a".to_string(),
            value: 1u32,
            expires_at_ms: 10,
        };
        let mut buf = Vec::new();
        write_record(&mut buf, &record).await.unwrap();
        write_record(&mut buf, &record).await.unwrap();
        let first_len = buf.len() / 2;
        buf.truncate(first_len + 3);

        let mut reader = buf.as_slice();
        assert!(read_record::<_, u32>(&mut reader).await.unwrap().is_some());
        let err = read_record::<_, u32>(&mut reader).await.unwrap_err();
        match err {
            CacheError::Io(e) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let mut buf = 16u64.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");
        let mut reader = buf.as_slice();
        let err = read_record::<_, u32>(&mut reader).await.unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }
}
