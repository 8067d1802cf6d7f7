use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CacheConfig;

use super::{expirable::Expirable, Cache};

/// Key/value store whose entries expire after a per-entry ttl.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    map: DashMap<String, Expirable<V>>,
    config: CacheConfig,
}

impl<V> ExpiringCache<V> {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            map: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = Expirable::with_ttl(value, Instant::now(), ttl);
        self.map.insert(key.to_owned(), entry);
    }

    /// An expired entry is removed here and reported as missing.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        {
            let entry = self.map.get(key)?;
            if !entry.is_expired_at(now) {
                return Some(Arc::clone(entry.value().value()));
            }
        }
        // Re-check under the write lock so a concurrent fresh `set` survives.
        self.map.remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }

    pub fn delete(&self, key: &str) {
        self.map.remove(key);
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.map
            .iter()
            .filter(|e| !e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Point-in-time copy of every live entry with its expiration.
    pub fn entries(&self) -> Vec<(String, Arc<V>, Instant)> {
        let now = Instant::now();
        self.map
            .iter()
            .filter(|e| !e.value().is_expired_at(now))
            .map(|e| {
                let entry = e.value();
                (e.key().clone(), Arc::clone(entry.value()), entry.expires_at())
            })
            .collect()
    }

    /// One sweep pass. Returns how many expired entries were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// First pass runs one full interval after the call.
    pub async fn clean(&self, shutdown: CancellationToken) {
        let period = self.config.sweep_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(?period, "expiration sweep started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        debug!(removed, remaining = self.len(), "swept expired entries");
                    }
                }
            }
        }
        info!("expiration sweep stopped");
    }
}

impl<V> ExpiringCache<V>
where
    V: Send + Sync + 'static,
{
    pub fn spawn_clean(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.clean(shutdown).await })
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Cache<V> for ExpiringCache<V> {
    fn set(&self, key: &str, value: V, ttl: Duration) {
        ExpiringCache::set(self, key, value, ttl)
    }

    fn get(&self, key: &str) -> Option<Arc<V>> {
        ExpiringCache::get(self, key)
    }

    fn delete(&self, key: &str) {
        ExpiringCache::delete(self, key)
    }
}
