//! Redis store backend.
//!
//! One multiplexed connection manager is shared by every clone of the
//! handle; blocking pops open their own connection so that a waiting `BLPOP`
//! never stalls unrelated requests.

mod error;
mod store;

pub use store::RedisStore;
