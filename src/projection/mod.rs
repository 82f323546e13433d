//! Derived views over vehicle and bid collections
//!
//! Inputs are [`Collection`] snapshots that carry a version token; every
//! projection caches its last result keyed on the tokens (and parameters)
//! it was computed from and recomputes only when one of them changes.

mod memo;
mod selectors;
mod timeline;

pub use memo::Memo;
pub use selectors::{
    AdminDashboardStats, BidView, StateProjector, UserVehicleStats, VehicleStatusHistory,
    VehicleWithBidInfo,
};
pub use timeline::{verification_timeline, TimelineStep};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Version token identifying one state of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(u64);

/// Immutable snapshot of an externally owned collection
///
/// Tokens are unique across every collection in the process, so two
/// different collections never share a version.
#[derive(Debug)]
pub struct Collection<T> {
    items: Arc<Vec<T>>,
    version: Version,
}

impl<T> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
            version: Version(next_token()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Swap in a new item list under a fresh token
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = Arc::new(items);
        self.version = Version(next_token());
    }
}

impl<T: Clone> Collection<T> {
    /// Mutate the items in place under a fresh token
    pub fn update(&mut self, f: impl FnOnce(&mut Vec<T>)) {
        f(Arc::make_mut(&mut self.items));
        self.version = Version(next_token());
    }
}

// Clones share items and token: same contents, same identity.
impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            version: self.version,
        }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}
