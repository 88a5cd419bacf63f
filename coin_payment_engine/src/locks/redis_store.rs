use std::time::Duration;

use log::*;
use redis::{aio::MultiplexedConnection, Script};

use crate::traits::{KeyValueStore, KvError};

/// Compare-and-delete as a Lua script, so that "is this still my lock?" and the delete are one
/// atomic step on the server.
const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed key-value store. Acquisition is `SET key value NX PX <ttl>`; the lease keeps a
/// crashed holder from wedging the key forever.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: MultiplexedConnection,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("🔒️ Connected to key-value store at {url}");
        Ok(Self { conn })
    }
}

impl KeyValueStore for RedisKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(DELETE_IF_EQUALS).key(key).arg(value).invoke_async(&mut conn).await?;
        Ok(deleted > 0)
    }
}
