//! Striped per-key exclusive sections.

use docache_core::DocumentId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// Fixed array of async mutexes addressed by key hash.
///
/// Every mutation of one document ID runs while holding its stripe, so the
/// read-merge-write sequence of an upsert is atomic per key and a flush can
/// never interleave with a delete of the same ID. Distinct keys that share a
/// stripe simply serialize.
#[derive(Debug)]
pub(crate) struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    pub(crate) fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    pub(crate) async fn lock(&self, id: &DocumentId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(id)].lock().await
    }

    fn stripe_of(&self, id: &DocumentId) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}
