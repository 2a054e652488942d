//! Per-requester rotation cursors over reference lists.
//!
//! Each `(requester, family)` key owns an atomic counter. `next_index`
//! returns the current value and advances it in one step, so concurrent
//! callers on the same key never observe a duplicate or skip a value.
//! Counters live for the process lifetime and are never evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::pipeline::types::ReferenceFamily;

type RotationKey = (String, ReferenceFamily);

/// Shared rotation state, injected into the processor.
#[derive(Default)]
pub struct RotationStore {
    cursors: RwLock<HashMap<RotationKey, Arc<AtomicU64>>>,
}

impl RotationStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the cursor for `(requester, family)` and advance it by one.
    pub async fn next_index(&self, requester: &str, family: ReferenceFamily) -> u64 {
        let counter = self.counter(requester, family).await;
        let index = counter.fetch_add(1, Ordering::SeqCst);
        debug!(requester, family = family.as_str(), index, "Rotation cursor advanced");
        index
    }

    /// Current cursor without advancing it (0 for unseen keys).
    pub async fn peek(&self, requester: &str, family: ReferenceFamily) -> u64 {
        let key = (requester.to_string(), family);
        self.cursors
            .read()
            .await
            .get(&key)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Number of tracked `(requester, family)` keys.
    pub async fn len(&self) -> usize {
        self.cursors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cursors.read().await.is_empty()
    }

    async fn counter(&self, requester: &str, family: ReferenceFamily) -> Arc<AtomicU64> {
        let key = (requester.to_string(), family);
        if let Some(counter) = self.cursors.read().await.get(&key) {
            return Arc::clone(counter);
        }
        let mut cursors = self.cursors.write().await;
        Arc::clone(cursors.entry(key).or_default())
    }
}

/// `list[cursor mod len]`, or `None` for an empty list.
pub fn select<'a>(list: &[&'a str], cursor: u64) -> Option<&'a str> {
    if list.is_empty() {
        return None;
    }
    let index = (cursor % list.len() as u64) as usize;
    Some(list[index])
}
