use std::{env, time::Duration};

use crate::lock::LockRelease;

/// Cache configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace prefix of every physical key (default: "not_set")
    pub app_name: String,
    /// Redis `host:port` (default: "localhost:6379")
    pub redis_addr: String,
    /// Redis password (default: none)
    pub redis_password: Option<String>,
    /// Redis logical database index (default: 0)
    pub redis_db: i64,
    /// Full Redis URL; overrides address, password and database when set
    pub redis_url: Option<String>,
    /// Interval between `try_lock` attempts in milliseconds (default: 10)
    pub lock_poll_interval_ms: u64,
    /// How `unlock` releases a lock (default: read-then-delete)
    pub lock_release: LockRelease,
    /// LRU bound of the in-memory store (default: 10,000)
    pub memory_max_entries: usize,
}

impl CacheConfig {
    /// Configuration with defaults for the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            redis_addr: "localhost:6379".to_string(),
            redis_password: None,
            redis_db: 0,
            redis_url: None,
            lock_poll_interval_ms: 10,
            lock_release: LockRelease::ReadThenDelete,
            memory_max_entries: 10_000,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_APP_NAME` - Namespace prefix (default: "not_set")
    /// - `REDIS_ADDR` - Redis address (default: "localhost:6379")
    /// - `REDIS_PASSWORD` - Redis password (default: none)
    /// - `REDIS_DB` - Redis database index (default: 0)
    /// - `REDIS_URL` - Full Redis URL, takes precedence over the three above
    /// - `LOCK_POLL_INTERVAL_MS` - `try_lock` polling interval (default: 10)
    /// - `LOCK_RELEASE` - "read-then-delete" or "compare-and-delete"
    /// - `MEMORY_MAX_ENTRIES` - In-memory store capacity (default: 10,000)
    pub fn from_env() -> Self {
        let defaults =
            Self::new(env::var("CACHE_APP_NAME").unwrap_or_else(|_| "not_set".to_string()));

        Self {
            redis_addr: env::var("REDIS_ADDR").unwrap_or(defaults.redis_addr),
            redis_password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            redis_db: env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.redis_db),
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            lock_poll_interval_ms: env::var("LOCK_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lock_poll_interval_ms),
            lock_release: env::var("LOCK_RELEASE")
                .ok()
                .and_then(|v| LockRelease::parse(&v))
                .unwrap_or(defaults.lock_release),
            memory_max_entries: env::var("MEMORY_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_max_entries),
            ..defaults
        }
    }

    /// Connection URL for the Redis client.
    ///
    /// Built as `redis://[:password@]addr/db` unless `redis_url` is set.
    #[cfg(feature = "redis")]
    pub fn redis_url(&self) -> String {
        if let Some(url) = &self.redis_url {
            return url.clone();
        }

        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(password),
                self.redis_addr,
                self.redis_db
            ),
            None => format!("redis://{}/{}", self.redis_addr, self.redis_db),
        }
    }

    /// Get the lock polling interval as a Duration.
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
