use std::{sync::Arc, time::Duration};

pub mod storage;

pub mod expirable;

/// Basic operations of a time-expiring key/value store.
pub trait Cache<V> {
    fn set(&self, key: &str, value: V, ttl: Duration);
    fn get(&self, key: &str) -> Option<Arc<V>>;
    fn delete(&self, key: &str);
}
