use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::traits::{KeyValueStore, KvError};

/// A process-local key-value store honouring the same lease semantics as the Redis-backed one.
/// Suitable for single-instance deployments and tests; it obviously cannot exclude callers in
/// other processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (value.to_string(), now + ttl));
                Ok(true)
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= now => {
                entries.remove(key);
                Ok(None)
            },
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match entries.get(key) {
            Some((current, expires_at)) if *expires_at > now && current == value => {
                entries.remove(key);
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_exclusive_until_expiry() {
        let store = MemoryKvStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_millis(40)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_millis(40)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.set_if_absent("k", "b", Duration::from_millis(40)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_equals_checks_the_owner() {
        let store = MemoryKvStore::new();
        store.set_if_absent("k", "a", Duration::from_secs(5)).await.unwrap();
        assert!(!store.delete_if_equals("k", "b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
        assert!(store.delete_if_equals("k", "a").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
