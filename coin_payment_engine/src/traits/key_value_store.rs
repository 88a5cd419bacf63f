use std::time::Duration;

use thiserror::Error;

/// The contract the distributed mutex needs from a shared key-value store.
///
/// Implementations must make `set_if_absent` and `delete_if_equals` atomic; those two operations
/// are what make the lease mutex safe when a holder dies or overruns its lease.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore: Clone + Send + Sync {
    /// Sets `key = value` with the given time-to-live, but only if the key does not currently
    /// exist. Returns `true` when the value was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Deletes the key only when its current value equals `value`, atomically. Returns `true`
    /// when the key was deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError>;
}

#[derive(Debug, Clone, Error)]
#[error("Key-value store error: {0}")]
pub struct KvError(pub String);

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        KvError(e.to_string())
    }
}
