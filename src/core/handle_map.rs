// Concurrency-safe key -> value table with monotonically increasing keys.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keys start at 1 and are never reused, so a stale key can only miss.
pub struct HandleMap<T> {
    next_key: AtomicU64,
    entries: Mutex<BTreeMap<u64, T>>,
}

impl<T> HandleMap<T> {
    pub const fn new() -> Self {
        Self {
            next_key: AtomicU64::new(1),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<u64, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, value: T) -> u64 {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.entries().insert(key, value);
        key
    }

    /// Removes the entry; exactly one of several racing callers gets `Some`.
    pub fn remove(&self, key: u64) -> Option<T> {
        self.entries().remove(&key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries().contains_key(&key)
    }

    pub fn get(&self, key: u64) -> Option<T>
    where
        T: Clone,
    {
        self.entries().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
