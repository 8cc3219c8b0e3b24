//! Store backend implementations.
//!
//! This module provides concrete implementations of the `Store` trait
//! defined in `cblcache_core::cache`. Backends are selected at compile time
//! via feature flags.
//!
//! # Feature Flags
//!
//! - `memory` (default): In-memory store using tokio synchronization primitives
//! - `redis` (default): Redis store using the redis crate
//!
//! Both backends may be compiled in together; the handle is generic over the
//! store it wraps.

#[cfg(not(any(feature = "memory", feature = "redis")))]
compile_error!(
    "No store backend selected. Enable 'memory' or 'redis' feature. \
    Example: cargo build -p cblcache --features memory"
);

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis_impl::RedisStore;
