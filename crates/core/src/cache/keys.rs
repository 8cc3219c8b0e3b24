//! Physical key composition.
//!
//! Every key sent to the store is namespaced by the application name so that
//! independently deployed applications sharing one Redis instance never
//! collide. Functional areas (locks, queues, counters, sets) add a module
//! discriminator so that a lock named `x` and a queue named `x` live under
//! different keys.
//!
//! Callers must not embed `:` or `.` in their logical keys when they rely on
//! this isolation; the separators are not escaped.

use std::fmt;

/// Functional area a physical key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Lock,
    Queue,
    Counter,
    Set,
}

impl Module {
    /// Literal inserted between the prefix and the caller's key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "dislock",
            Self::Queue => "mq",
            Self::Counter => "counter",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps logical keys to physical store keys for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComposer {
    prefix: String,
}

impl KeyComposer {
    /// Creates a composer for the given namespace prefix (the application name).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `"{prefix}:{key}"`.
    pub fn compose(&self, key: &str) -> String {
        compose_key(&self.prefix, key)
    }

    /// Returns `"{prefix}:{module}.{key}"`.
    pub fn compose_module(&self, module: Module, key: &str) -> String {
        compose_module_key(&self.prefix, module, key)
    }
}

/// Returns the physical key for a scalar entry.
///
/// # Examples
///
/// ```
/// use cblcache_core::cache::compose_key;
///
/// assert_eq!(compose_key("shop", "user.42"), "shop:user.42");
/// ```
pub fn compose_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Returns the physical key for an entry owned by a functional module.
///
/// # Examples
///
/// ```
/// use cblcache_core::cache::{compose_module_key, Module};
///
/// assert_eq!(compose_module_key("shop", Module::Lock, "order"), "shop:dislock.order");
/// assert_eq!(compose_module_key("shop", Module::Queue, "order"), "shop:mq.order");
/// ```
pub fn compose_module_key(prefix: &str, module: Module, key: &str) -> String {
    format!("{}:{}.{}", prefix, module.as_str(), key)
}
