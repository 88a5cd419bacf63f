//! Lease-based distributed mutex over a shared key-value store.
//!
//! The mutex collapses contention and makes same-user concurrent requests observably sequential.
//! It is not the correctness primitive: if a holder dies, the lease expires and another caller
//! may enter, which is why every balance update still carries its own optimistic version guard.

mod memory_store;
mod redis_store;

use std::time::Duration;

use log::*;
use thiserror::Error;

pub use memory_store::MemoryKvStore;
pub use redis_store::RedisKvStore;

use crate::{
    db_types::OrderNo,
    traits::{KeyValueStore, KvError},
};

pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

pub fn pay_lock_key(user_id: i64) -> String {
    format!("pay:lock:user:{user_id}")
}

pub fn refund_lock_key(order_no: &OrderNo) -> String {
    format!("refund:lock:order:{order_no}")
}

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Timed out waiting for lock {key}")]
    Timeout { key: String },
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// A best-effort advisory mutex. `lock` polls the conditional set until it wins or the attempt
/// budget runs out; `unlock` only deletes the key while it still carries the caller's owner
/// token, so a holder whose lease expired cannot release a successor's lock.
#[derive(Debug, Clone)]
pub struct DistributedMutex<K> {
    store: K,
    lease: Duration,
    poll_interval: Duration,
    max_attempts: u32,
}

impl<K: KeyValueStore> DistributedMutex<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            lease: DEFAULT_LEASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn lock(&self, key: &str, owner: &str) -> Result<(), LockError> {
        for attempt in 1..=self.max_attempts {
            if self.store.set_if_absent(key, owner, self.lease).await? {
                trace!("🔒️ Lock {key} acquired by {owner} on attempt {attempt}");
                return Ok(());
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        debug!("🔒️ Gave up on lock {key} for {owner} after {} attempts", self.max_attempts);
        Err(LockError::Timeout { key: key.to_string() })
    }

    pub async fn unlock(&self, key: &str, owner: &str) -> Result<(), LockError> {
        if self.store.delete_if_equals(key, owner).await? {
            trace!("🔒️ Lock {key} released by {owner}");
        } else {
            // Either the lease expired, or another owner holds the key now. Nothing to release.
            debug!("🔒️ Lock {key} was not held by {owner} at release time");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quick_mutex(store: MemoryKvStore) -> DistributedMutex<MemoryKvStore> {
        DistributedMutex::new(store)
            .with_lease(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(5))
            .with_max_attempts(3)
    }

    #[tokio::test]
    async fn lock_and_unlock() {
        let mutex = quick_mutex(MemoryKvStore::new());
        mutex.lock("pay:lock:user:1", "req-1").await.unwrap();
        mutex.unlock("pay:lock:user:1", "req-1").await.unwrap();
        // Released, so a second owner can take it straight away.
        mutex.lock("pay:lock:user:1", "req-2").await.unwrap();
    }

    #[tokio::test]
    async fn contention_times_out() {
        let store = MemoryKvStore::new();
        let holder = DistributedMutex::new(store.clone()).with_lease(Duration::from_secs(30));
        holder.lock("pay:lock:user:7", "req-1").await.unwrap();

        let contender = quick_mutex(store);
        let err = contender.lock("pay:lock:user:7", "req-2").await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn expired_lease_admits_the_next_caller() {
        let store = MemoryKvStore::new();
        let mutex = quick_mutex(store);
        mutex.lock("pay:lock:user:9", "req-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        mutex.lock("pay:lock:user:9", "req-2").await.unwrap();
    }

    #[tokio::test]
    async fn unlock_by_non_owner_leaves_the_lock_in_place() {
        let store = MemoryKvStore::new();
        let mutex = DistributedMutex::new(store.clone())
            .with_poll_interval(Duration::from_millis(5))
            .with_max_attempts(2);
        mutex.lock("refund:lock:order:PAY1", "req-1").await.unwrap();
        mutex.unlock("refund:lock:order:PAY1", "req-2").await.unwrap();
        assert_eq!(store.get("refund:lock:order:PAY1").await.unwrap().as_deref(), Some("req-1"));
    }

    #[test]
    fn key_formats() {
        assert_eq!(pay_lock_key(42), "pay:lock:user:42");
        assert_eq!(refund_lock_key(&OrderNo::from("PAY123".to_string())), "refund:lock:order:PAY123");
    }
}
