mod error;
mod keys;
mod scripts;
mod serialization;
mod traits;
mod ttl;

pub use error::{CacheError, Result};
pub use keys::{compose_key, compose_module_key, KeyComposer, Module};
pub use scripts::{CompareAndDelete, FloorDecrement, COMPARE_AND_DELETE, DECR_MIN_ZERO};
pub use serialization::{deserialize_object, serialize_object, CacheValue};
pub use traits::{effective_ttl, ttl_millis, Store};
pub use ttl::{Advisory, Ttl, TTL_MISSING, TTL_PERSISTENT};
