use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

/// Roughly a century. Used when `now + ttl` would overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A stored value together with the instant after which it is gone.
#[derive(Debug)]
pub struct Expirable<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Clone for Expirable<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}

impl<V> Expirable<V> {
    pub fn new(value: V, expires_at: Instant) -> Self {
        Self {
            value: Arc::new(value),
            expires_at,
        }
    }

    pub fn with_ttl(value: V, now: Instant, ttl: Duration) -> Self {
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self::new(value, expires_at)
    }

    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Strictly after: an entry whose expiration equals `now` is still live.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
