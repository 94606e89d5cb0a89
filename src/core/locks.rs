//! Per-item exclusive locks.
//!
//! Mutations of the same (type, slug) are serialized; different items
//! never contend. Entries are dropped from the table once no guard or
//! waiter holds them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identity of a lockable item
pub type ItemKey = (String, String);

/// Table of per-item locks
#[derive(Debug, Default)]
pub struct ItemLocks {
    slots: Mutex<HashMap<ItemKey, Weak<AsyncMutex<()>>>>,
}

/// Held while an item is being mutated; released on drop
#[derive(Debug)]
pub struct ItemGuard {
    key: ItemKey,
    _guard: OwnedMutexGuard<()>,
}

impl ItemGuard {
    pub fn type_name(&self) -> &str {
        &self.key.0
    }

    pub fn slug(&self) -> &str {
        &self.key.1
    }
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ItemKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.retain(|_, slot| slot.strong_count() > 0);

        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(key.clone(), Arc::downgrade(&slot));
        slot
    }

    /// Wait for exclusive access to one item
    pub async fn acquire(&self, type_name: &str, slug: &str) -> ItemGuard {
        let key = (type_name.to_string(), slug.to_string());
        let guard = self.slot(&key).lock_owned().await;
        ItemGuard { key, _guard: guard }
    }

    /// Lock several items at once, always in sorted order so two callers
    /// locking overlapping sets cannot deadlock
    pub async fn acquire_all(&self, type_name: &str, slugs: &[&str]) -> Vec<ItemGuard> {
        let mut ordered: Vec<&str> = slugs.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for slug in ordered {
            guards.push(self.acquire(type_name, slug).await);
        }
        guards
    }

    /// Number of items currently locked or awaited
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }
}
