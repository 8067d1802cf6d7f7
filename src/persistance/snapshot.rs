use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufReader, BufWriter},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::Result, storage::storage::ExpiringCache};

use super::{read_record, unix_millis, write_record, Persistent, SnapshotRecord};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct SnapshotCreator {
    path: PathBuf,
}

impl SnapshotCreator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unique per call so overlapping saves never share a temp file.
    fn tmp_path(&self) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}.{seq}.tmp", process::id()));
        PathBuf::from(name)
    }

    /// Writes the live entries of `cc`. The previous snapshot is replaced
    /// only once the new one is complete.
    pub async fn snapshot<V>(&self, cc: &ExpiringCache<V>) -> Result<u64>
    where
        V: Serialize,
    {
        let entries = cc.entries();
        let tmp = self.tmp_path();

        if let Err(e) = Self::write_entries(&tmp, &entries).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = entries.len(), "snapshot written");

        Ok(entries.len() as u64)
    }

    async fn write_entries<V>(tmp: &Path, entries: &[(String, Arc<V>, Instant)]) -> Result<()>
    where
        V: Serialize,
    {
        let now = Instant::now();
        let wall = SystemTime::now();

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp)
            .await?;
        let mut fw = BufWriter::new(file);

        for (key, value, expires_at) in entries {
            let remaining = expires_at.saturating_duration_since(now);
            let expires_at_ms = wall
                .checked_add(remaining)
                .map(unix_millis)
                .unwrap_or(u64::MAX);
            let record = SnapshotRecord {
                key: key.clone(),
                value: value.as_ref(),
                expires_at_ms,
            };
            write_record(&mut fw, &record).await?;
        }
        fw.flush().await?;
        Ok(())
    }

    /// Records that already expired are skipped.
    pub async fn restore<V>(&self, cc: &ExpiringCache<V>) -> Result<u64>
    where
        V: DeserializeOwned,
    {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot to restore");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let now_ms = unix_millis(SystemTime::now());
        let mut restored = 0u64;
        let mut skipped = 0u64;
        while let Some(record) = read_record::<_, V>(&mut reader).await? {
            if record.is_expired_at(now_ms) {
                skipped += 1;
                continue;
            }
            let ttl = record.remaining(now_ms);
            cc.set(&record.key, record.value, ttl);
            restored += 1;
        }

        info!(path = %self.path.display(), restored, skipped, "snapshot restored");
        Ok(restored)
    }

    /// Decodes every record in the snapshot, expired ones included.
    pub async fn read_all<V>(&self) -> Result<Vec<SnapshotRecord<V>>>
    where
        V: DeserializeOwned,
    {
        let mut reader = BufReader::new(File::open(&self.path).await?);
        let mut records = Vec::new();
        while let Some(record) = read_record(&mut reader).await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Writes one last snapshot after `shutdown` fires.
    pub async fn run<V>(&self, cc: Arc<ExpiringCache<V>>, period: Duration, shutdown: CancellationToken)
    where
        V: Serialize + Send + Sync,
    {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.snapshot(&cc).await {
                        warn!(path = %self.path.display(), error = %e, "snapshot failed");
                    }
                }
            }
        }

        match self.snapshot(&cc).await {
            Ok(records) => info!(path = %self.path.display(), records, "final snapshot written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "final snapshot failed"),
        }
    }
}

#[async_trait]
impl<V> Persistent<V> for ExpiringCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn save_to_file(&self, path: &Path) -> Result<u64> {
        SnapshotCreator::new(path).snapshot(self).await
    }

    async fn load_from_file(&self, path: &Path) -> Result<u64> {
        SnapshotCreator::new(path).restore(self).await
    }
}
