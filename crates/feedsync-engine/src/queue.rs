//! Registration registry and per-store pending-update sets over a
//! [`StateStore`], with every read-modify-write done under its lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use feedsync_core::{
    ItemId, LockGuard, LockManager, RegisteredStore, StateError, StateKey, StateStore,
    INSTALLED_STORES_KEY,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SyncError;

/// Registered stores keyed by store code.
pub type Registry = BTreeMap<String, RegisteredStore>;

pub struct UpdateQueue {
    state: Arc<dyn StateStore>,
    locks: Arc<dyn LockManager>,
    lock_wait: Duration,
    registration_backoff_secs: i64,
}

impl UpdateQueue {
    pub fn new(
        state: Arc<dyn StateStore>,
        locks: Arc<dyn LockManager>,
        lock_wait: Duration,
        registration_backoff_secs: i64,
    ) -> Self {
        Self {
            state,
            locks,
            lock_wait,
            registration_backoff_secs,
        }
    }

    /// Serializes reconciliation passes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Lock`] if the lock is not acquired in time.
    pub async fn lock_registry(&self) -> Result<LockGuard, SyncError> {
        let name = StateKey::lock(INSTALLED_STORES_KEY);
        Ok(self.locks.lock(&name, self.lock_wait).await?)
    }

    /// # Errors
    ///
    /// Returns [`StateError`] if the backend fails or the stored value is not
    /// a store-code map.
    pub async fn registered_stores(&self) -> Result<Registry, StateError> {
        Ok(self.read(INSTALLED_STORES_KEY).await?.unwrap_or_default())
    }

    /// Callers must hold [`UpdateQueue::lock_registry`].
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the value cannot be written.
    pub async fn save_registered_stores(&self, stores: &Registry) -> Result<(), StateError> {
        let value = serde_json::to_value(stores).map_err(|source| StateError::Malformed {
            key: INSTALLED_STORES_KEY.to_string(),
            source,
        })?;
        self.state.set(INSTALLED_STORES_KEY, value).await
    }

    /// # Errors
    ///
    /// Returns [`StateError`] if the pending set cannot be read.
    pub async fn pending(&self, code: &str) -> Result<BTreeSet<ItemId>, StateError> {
        Ok(self
            .read(&StateKey::pending(code))
            .await?
            .unwrap_or_default())
    }

    /// Adds `ids` to the store's pending set. Returns whether the set changed;
    /// nothing is written when it did not.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on lock timeout or state failure.
    pub async fn add_pending(&self, code: &str, ids: &[ItemId]) -> Result<bool, SyncError> {
        self.update_pending(code, |pending| {
            ids.iter().fold(false, |changed, id| pending.insert(*id) || changed)
        })
        .await
    }

    /// Removes `ids` from the store's pending set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on lock timeout or state failure.
    pub async fn remove_pending(&self, code: &str, ids: &[ItemId]) -> Result<bool, SyncError> {
        self.update_pending(code, |pending| {
            ids.iter().fold(false, |changed, id| pending.remove(id) || changed)
        })
        .await
    }

    /// Queues a freshly registered store's whole catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on lock timeout or state failure.
    pub async fn seed_pending(&self, code: &str, ids: &[ItemId]) -> Result<(), SyncError> {
        self.add_pending(code, ids).await.map(|_| ())
    }

    /// Replaces the ids a sync pass started from with what it left behind.
    ///
    /// `snapshot` is the pending set the pass read; `residual` is what it
    /// could not deliver. Ids enqueued while the pass ran are kept, and ids
    /// removed while it ran are not put back.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on lock timeout or state failure.
    pub async fn merge_residual(
        &self,
        code: &str,
        snapshot: &BTreeSet<ItemId>,
        residual: &BTreeSet<ItemId>,
    ) -> Result<BTreeSet<ItemId>, SyncError> {
        let mut merged = BTreeSet::new();
        self.update_pending(code, |pending| {
            let removed_meanwhile: BTreeSet<ItemId> =
                snapshot.difference(pending).copied().collect();
            let added_meanwhile = pending.difference(snapshot).copied();
            let next: BTreeSet<ItemId> = added_meanwhile
                .chain(residual.difference(&removed_meanwhile).copied())
                .collect();
            let changed = next != *pending;
            *pending = next;
            merged.clone_from(pending);
            changed
        })
        .await?;
        Ok(merged)
    }

    /// Forgets the pending set and failure marker of a store that is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on lock timeout or state failure.
    pub async fn clear_store(&self, code: &str) -> Result<(), SyncError> {
        let key = StateKey::pending(code);
        let _guard = self.locks.lock(&StateKey::lock(&key), self.lock_wait).await?;
        self.state.delete(&key).await?;
        self.state
            .delete(&StateKey::registration_marker(code))
            .await?;
        Ok(())
    }

    /// Whether a registration attempt is allowed at unix time `now`: no
    /// failure recorded, or the last one is older than the backoff window.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the marker cannot be read.
    pub async fn needs_registration(&self, code: &str, now: i64) -> Result<bool, StateError> {
        let last_failure: Option<i64> = self.read(&StateKey::registration_marker(code)).await?;
        Ok(last_failure.is_none_or(|t| now - t > self.registration_backoff_secs))
    }

    /// Records a failed registration at unix time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the marker cannot be written.
    pub async fn note_registration_failed(&self, code: &str, now: i64) -> Result<(), StateError> {
        self.state
            .set(&StateKey::registration_marker(code), Value::from(now))
            .await
    }

    /// Last failed registration time, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the marker cannot be read.
    pub async fn last_registration_failure(&self, code: &str) -> Result<Option<i64>, StateError> {
        self.read(&StateKey::registration_marker(code)).await
    }

    async fn update_pending<F>(&self, code: &str, mutate: F) -> Result<bool, SyncError>
    where
        F: FnOnce(&mut BTreeSet<ItemId>) -> bool + Send,
    {
        let key = StateKey::pending(code);
        let _guard = self.locks.lock(&StateKey::lock(&key), self.lock_wait).await?;
        let mut pending: BTreeSet<ItemId> = self.read(&key).await?.unwrap_or_default();
        let changed = mutate(&mut pending);
        if changed {
            if pending.is_empty() {
                self.state.delete(&key).await?;
            } else {
                let value = Value::from(pending.into_iter().collect::<Vec<_>>());
                self.state.set(&key, value).await?;
            }
        }
        Ok(changed)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.state.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StateError::Malformed {
                    key: key.to_string(),
                    source,
                }),
        }
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
