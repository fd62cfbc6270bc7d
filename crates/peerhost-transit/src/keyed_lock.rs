//! Per-key async locks for reconciliation.
//!
//! A lookup-then-commit on one dedup key must not interleave with another
//! reconciliation on the same key, or two transfers could both see "not found"
//! and create duplicate files.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 64;

/// Dedup identifier spaces on a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    UniqueId { drive_id: Uuid, unique_id: Uuid },
    GlobalTransitId { drive_id: Uuid, global_transit_id: Uuid },
}

/// Holds every acquired key lock until dropped.
#[must_use = "the lock is released when the guard is dropped"]
pub struct KeyedLockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

pub struct KeyedLock<K> {
    locks: Mutex<HashMap<K, Weak<Mutex<()>>>>,
}

impl<K> KeyedLock<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&fresh));
        fresh
    }

    /// Acquire all `keys`. Keys are taken in sorted order so two callers
    /// locking overlapping sets cannot deadlock.
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = K>) -> KeyedLockGuard {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let handle = self.handle(key).await;
            guards.push(handle.lock_owned().await);
        }
        KeyedLockGuard { _guards: guards }
    }

    /// Number of keys currently tracked (held or recently released).
    pub async fn tracked_keys(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Clone + Eq + Hash + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}
