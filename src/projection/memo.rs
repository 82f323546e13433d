use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Single-entry cache keyed on the inputs a value was derived from
///
/// A lookup with the same key returns the cached value; any other key
/// recomputes and replaces it.
#[derive(Debug)]
pub struct Memo<K, V> {
    slot: Mutex<Option<(K, Arc<V>)>>,
    computations: AtomicUsize,
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            computations: AtomicUsize::new(0),
        }
    }

    pub fn get_or_compute(&self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        let mut slot = self.slot.lock();
        if let Some((cached_key, value)) = slot.as_ref() {
            if *cached_key == key {
                return value.clone();
            }
        }

        let value = Arc::new(compute());
        self.computations.fetch_add(1, Ordering::Relaxed);
        *slot = Some((key, value.clone()));
        value
    }

    /// How many times the value has been computed
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

impl<K: PartialEq, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
