//! Persisted-state key layout and the storage and locking capabilities the
//! engine is driven through.
//!
//! State is a flat key-value space of JSON documents:
//!
//! | Key                      | Value                                   |
//! |--------------------------|-----------------------------------------|
//! | `installed_stores`       | store code → [`RegisteredStore`] object |
//! | `store_<code>`           | unix timestamp of the last failed registration |
//! | `store_<code>_products`  | pending item ids                        |
//!
//! Every read-modify-write of a key happens while holding the lock named
//! `<key>_lock`.
//!
//! [`RegisteredStore`]: crate::RegisteredStore

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const INSTALLED_STORES_KEY: &str = "installed_stores";

/// Deterministic key and lock names derived from a store code.
pub struct StateKey;

impl StateKey {
    #[must_use]
    pub fn registration_marker(code: &str) -> String {
        format!("store_{code}")
    }

    #[must_use]
    pub fn pending(code: &str) -> String {
        format!("store_{code}_products")
    }

    #[must_use]
    pub fn lock(key: &str) -> String {
        format!("{key}_lock")
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state backend error: {0}")]
    Backend(String),

    #[error("malformed state under key {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Key-value persistence for registration and queue state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError>;

    async fn delete(&self, key: &str) -> Result<(), StateError>;
}

/// Named mutual exclusion with a bounded wait.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Waits up to `wait` for the lock called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the lock is still held by someone
    /// else once `wait` has elapsed.
    async fn lock(&self, name: &str, wait: Duration) -> Result<LockGuard, LockError>;
}

/// Holds a lock until dropped.
pub struct LockGuard {
    name: String,
    _held: Box<dyn Send>,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, held: impl Send + 'static) -> Self {
        Self {
            name: name.into(),
            _held: Box::new(held),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_store_code() {
        assert_eq!(StateKey::registration_marker("main_AED"), "store_main_AED");
        assert_eq!(StateKey::pending("main_AED"), "store_main_AED_products");
    }

    #[test]
    fn lock_names_append_suffix() {
        assert_eq!(
            StateKey::lock(INSTALLED_STORES_KEY),
            "installed_stores_lock"
        );
        assert_eq!(
            StateKey::lock(&StateKey::pending("main")),
            "store_main_products_lock"
        );
    }

    #[test]
    fn guard_runs_release_on_drop() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        struct Release(Arc<AtomicBool>);
        impl Drop for Release {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let guard = LockGuard::new("x_lock", Release(Arc::clone(&released)));
        assert_eq!(guard.name(), "x_lock");
        assert!(!released.load(Ordering::SeqCst));
        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }
}
