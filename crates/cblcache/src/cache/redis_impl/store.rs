//! Redis implementation of [`Store`].
//!
//! Expiries are sent with millisecond precision (`SET ... PX`, `PEXPIRE`).
//! Counter increments run inside `MULTI`/`EXEC` together with the expiry
//! refresh, and the floor-at-zero decrement and compare-and-delete run as
//! Lua scripts (`EVALSHA`, falling back to `EVAL`).

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;

use cblcache_core::cache::{
    effective_ttl, ttl_millis, CacheError, CompareAndDelete, FloorDecrement, Result, Store,
    COMPARE_AND_DELETE, DECR_MIN_ZERO,
};

use super::error::map_redis_error;

/// Upper bound on establishing a connection, retries included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_RETRIES: usize = 2;
const CONNECT_MAX_DELAY_MS: u64 = 1_000;

/// Redis store using a connection manager for reconnects and pooling.
pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
    decr_min_zero: redis::Script,
    compare_and_delete: redis::Script,
}

impl RedisStore {
    /// Connects to Redis and verifies the connection with `PING`.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://:secret@localhost:6379/0")
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the server cannot be reached
    /// or does not answer the liveness check.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(CONNECT_RETRIES)
            .set_max_delay(CONNECT_MAX_DELAY_MS)
            .set_connection_timeout(CONNECT_TIMEOUT);

        let connecting = async {
            let conn = ConnectionManager::new_with_config(client.clone(), config)
                .await
                .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

            let store = Self {
                client,
                conn: RwLock::new(Some(conn)),
                decr_min_zero: redis::Script::new(DECR_MIN_ZERO),
                compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
            };

            store
                .ping()
                .await
                .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

            Ok(store)
        };

        tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| {
                CacheError::ConnectionFailed(format!(
                    "no answer from redis within {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
    }

    /// Returns a handle on the shared connection, or an error once closed.
    fn conn(&self) -> Result<ConnectionManager> {
        let guard = self.conn.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| CacheError::ConnectionFailed("cache closed".to_string()))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::ConnectionFailed(format!(
                "unexpected PING reply: {pong}"
            )))
        }
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.write().unwrap_or_else(PoisonError::into_inner);
        // Dropping the last manager clone closes the socket.
        guard.take();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn()?;
        let result: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = effective_ttl(ttl) {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let _: () = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = effective_ttl(ttl) {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        // SET … NX replies "OK" when the key was set, nil otherwise.
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn()?;
        let removed: u64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn()?;
        let secs: i64 = conn.ttl(key).await.map_err(map_redis_error)?;
        Ok(secs)
    }

    async fn pttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn()?;
        let millis: i64 = conn.pttl(key).await.map_err(map_redis_error)?;
        Ok(millis)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn()?;
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(applied)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<CompareAndDelete> {
        let mut conn = self.conn()?;
        let (status, holder): (i64, String) = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        CompareAndDelete::from_reply(status, holder)
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        let mut conn = self.conn()?;

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("INCRBY").arg(key).arg(delta);
        if let Some(ttl) = effective_ttl(ttl) {
            pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
        }

        let (value,): (i64,) = pipe.query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn()?;
        let value: i64 = conn.decr(key, delta).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn decr_min_zero(&self, key: &str) -> Result<FloorDecrement> {
        let mut conn = self.conn()?;
        let (status, value): (i64, i64) = self
            .decr_min_zero
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        FloorDecrement::from_reply(status, value)
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<u64> {
        let mut conn = self.conn()?;
        let len: u64 = conn.rpush(key, value).await.map_err(map_redis_error)?;
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn()?;
        let head: Option<Vec<u8>> = redis::cmd("LPOP")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(head)
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // Fail fast once closed, even though the pop uses its own connection.
        self.conn()?;

        let mut conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            CacheError::ConnectionFailed("blocking pop connection timed out".to_string())
        })?
        .map_err(map_redis_error)?;

        // BLPOP replies [key, value], or nil on timeout.
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn()?;
        let len: u64 = conn.llen(key).await.map_err(map_redis_error)?;
        Ok(len)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        let mut conn = self.conn()?;
        let added: u64 = conn.sadd(key, members).await.map_err(map_redis_error)?;
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        let mut conn = self.conn()?;
        let removed: u64 = conn.srem(key, members).await.map_err(map_redis_error)?;
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let members: Vec<String> = conn.smembers(key).await.map_err(map_redis_error)?;
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn()?;
        let count: u64 = conn.scard(key).await.map_err(map_redis_error)?;
        Ok(count)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let present: bool = conn.sismember(key, member).await.map_err(map_redis_error)?;
        Ok(present)
    }

    async fn srandmember(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        // A positive count never repeats a member.
        let sample: Vec<String> = redis::cmd("SRANDMEMBER")
            .arg(key)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(sample)
    }
}
