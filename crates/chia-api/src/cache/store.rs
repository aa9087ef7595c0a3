use super::{CacheEntry, CacheTag, QueryKey};
use crate::config::ClientDefaults;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

struct Slot {
    entry: Arc<CacheEntry>,
    subscribers: usize,
    /// Bumped whenever the subscriber count changes, so a pending removal can
    /// tell whether the entry was reacquired in the meantime.
    epoch: u64,
}

/// Reference-counted set of cache entries.
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Slot>>,
    keep_unused_for: Duration,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("keep_unused_for", &self.keep_unused_for)
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(ClientDefaults::KEEP_UNUSED_DATA_FOR)
    }
}

impl QueryCache {
    pub fn new(keep_unused_for: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            keep_unused_for,
        }
    }

    pub fn keep_unused_for(&self) -> Duration {
        self.keep_unused_for
    }

    /// Add a subscriber to the entry for `key`, creating it if needed.
    ///
    /// Returns the entry and whether this call created it.
    pub fn acquire(
        &self,
        key: QueryKey,
        args: Value,
        provides: Vec<CacheTag>,
    ) -> (Arc<CacheEntry>, bool) {
        let mut entries = self.lock();
        if let Some(slot) = entries.get_mut(&key) {
            slot.subscribers += 1;
            slot.epoch += 1;
            return (slot.entry.clone(), false);
        }

        debug!("Cache entry created: {}", key);
        let entry = Arc::new(CacheEntry::new(key.clone(), args, provides));
        entries.insert(
            key,
            Slot {
                entry: entry.clone(),
                subscribers: 1,
                epoch: 0,
            },
        );
        (entry, true)
    }

    /// Drop one subscriber. An entry left unused is removed after
    /// `keep_unused_for` unless it is acquired again first. Outside a tokio
    /// runtime the removal happens immediately.
    pub fn release(self: &Arc<Self>, key: &QueryKey) {
        let epoch = {
            let mut entries = self.lock();
            let Some(slot) = entries.get_mut(key) else {
                return;
            };
            slot.subscribers = slot.subscribers.saturating_sub(1);
            slot.epoch += 1;
            if slot.subscribers > 0 {
                return;
            }
            slot.epoch
        };

        if self.keep_unused_for.is_zero() {
            self.remove_if_unused(key, epoch);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.remove_if_unused(key, epoch);
            return;
        };

        let cache = Arc::downgrade(self);
        let key = key.clone();
        let delay = self.keep_unused_for;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(cache) = cache.upgrade() {
                cache.remove_if_unused(&key, epoch);
            }
        });
    }

    fn remove_if_unused(&self, key: &QueryKey, epoch: u64) {
        let removed = {
            let mut entries = self.lock();
            match entries.get(key) {
                Some(slot) if slot.subscribers == 0 && slot.epoch == epoch => entries.remove(key),
                _ => None,
            }
        };

        if let Some(slot) = removed {
            debug!("Cache entry removed: {}", key);
            slot.entry.mark_removed();
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.lock().get(key).map(|slot| slot.entry.clone())
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.lock().get(key).map(|slot| slot.subscribers).unwrap_or(0)
    }

    /// Entries providing any tag matched by `tags`.
    pub fn entries_with_tags(&self, tags: &[CacheTag]) -> Vec<Arc<CacheEntry>> {
        self.lock()
            .values()
            .filter(|slot| {
                slot.entry
                    .provides()
                    .iter()
                    .any(|provided| tags.iter().any(|tag| provided.matches(tag)))
            })
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Remove every entry immediately.
    pub fn clear(&self) {
        let drained: Vec<Slot> = self.lock().drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            slot.entry.mark_removed();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
