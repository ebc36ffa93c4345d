//! Single-process state and lock implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use feedsync_core::{LockError, LockGuard, LockManager, StateError, StateStore};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Named async mutexes. Waiting is bounded with `tokio::time::timeout`.
#[derive(Debug, Default)]
pub struct InMemoryLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InMemoryLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, name: &str) -> Result<Arc<Mutex<()>>, LockError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LockError::Backend("lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(name.to_string()).or_default()))
    }
}

#[async_trait]
impl LockManager for InMemoryLocks {
    async fn lock(&self, name: &str, wait: Duration) -> Result<LockGuard, LockError> {
        let mutex = self.mutex_for(name)?;
        match tokio::time::timeout(wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(LockGuard::new(name, guard)),
            Err(_) => Err(LockError::Timeout {
                name: name.to_string(),
                waited: wait,
            }),
        }
    }
}
