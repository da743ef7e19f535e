//! Pipeline instance cache
//!
//! Keyed by capability pair: at most one loaded instance per pair. Entries
//! are inserted by the execution service and removed by the eviction
//! sweeper once idle for longer than the keep-alive timeout.
//!
//! Lookups and inserts are separate steps, and a load happens between
//! them. Two jobs for a pair that is not cached yet may therefore both load
//! it; the later insert replaces the earlier one and both jobs still run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::Pipeline;

struct CachedInstance {
    pipeline: Arc<dyn Pipeline>,
    last_used: Instant,
}

/// Loaded pipeline instances shared by every job
#[derive(Default)]
pub struct InstanceCache {
    entries: Mutex<HashMap<String, CachedInstance>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedInstance>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached instance for `key` and marks it used at `now`
    ///
    /// An instance that reports itself dead is dropped instead.
    pub fn checkout(&self, key: &str, now: Instant) -> Option<Arc<dyn Pipeline>> {
        let mut entries = self.entries();
        let entry = entries.get_mut(key)?;

        if !entry.pipeline.is_alive() {
            entries.remove(key);
            return None;
        }

        entry.last_used = now;
        Some(Arc::clone(&entry.pipeline))
    }

    /// Stores a freshly loaded instance as used at `now`
    pub fn insert(&self, key: impl Into<String>, pipeline: Arc<dyn Pipeline>, now: Instant) {
        self.entries().insert(
            key.into(),
            CachedInstance {
                pipeline,
                last_used: now,
            },
        );
    }

    /// Removes every instance idle for longer than `keep_alive`
    ///
    /// Jobs already holding an evicted instance keep using it; only the
    /// cache's reference is dropped.
    ///
    /// # Returns
    /// The keys that were evicted
    pub fn evict_idle(&self, now: Instant, keep_alive: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.entries().retain(|key, entry| {
            let keep = now.saturating_duration_since(entry.last_used) <= keep_alive;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });
        evicted
    }

    #[allow(dead_code)]
    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
