//! Shared engine state: cache map, write-back queue and the flush/evict
//! primitives used by both caller operations and the maintenance loop.
//!
//! Cross-container invariant: an ID is in `pending` only while `entries`
//! holds an entry for it. IDs are enqueued after their entry is installed
//! and dequeued before their entry is removed, always under the key lock.

use std::panic::AssertUnwindSafe;

use dashmap::{DashMap, DashSet};
use docache_core::{CacheConfig, DocacheResult, Document, DocumentId, StoreError};
use futures_util::future::join_all;
use futures_util::FutureExt;

use super::entry::CacheEntry;
use super::key_lock::KeyLocks;
use super::stats::{CacheStats, EngineMetrics};
use crate::merge::MergePolicy;
use crate::store::BackingStore;

pub(crate) struct EngineCore<S, P> {
    pub(crate) store: S,
    pub(crate) policy: P,
    pub(crate) config: CacheConfig,
    pub(crate) entries: DashMap<DocumentId, CacheEntry>,
    pub(crate) pending: DashSet<DocumentId>,
    pub(crate) locks: KeyLocks,
    pub(crate) metrics: EngineMetrics,
}

impl<S, P> EngineCore<S, P>
where
    S: BackingStore,
    P: MergePolicy,
{
    pub(crate) fn new(store: S, policy: P, config: CacheConfig, stripes: usize) -> Self {
        Self {
            store,
            policy,
            config,
            entries: DashMap::new(),
            pending: DashSet::new(),
            locks: KeyLocks::new(stripes),
            metrics: EngineMetrics::default(),
        }
    }

    /// Install a fresh entry for `id`, replacing any previous one.
    pub(crate) fn install(&self, id: &DocumentId, data: Document) {
        let entry = CacheEntry::new(id.clone(), data, self.config.entry_ttl);
        self.entries.insert(id.clone(), entry);
    }

    /// Data of a non-expired entry, if any.
    pub(crate) fn live(&self, id: &DocumentId) -> Option<Document> {
        self.entries
            .get(id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data().clone())
    }

    /// Install an entry and mark it for write-back. Caller holds the key lock.
    pub(crate) fn stage(&self, id: &DocumentId, data: Document) {
        self.install(id, data);
        self.pending.insert(id.clone());
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.metrics
            .snapshot(self.entries.len() as u64, self.pending.len() as u64)
    }

    // ========================================================================
    // FLUSH
    // ========================================================================

    /// Write the current entry for `id` to the store. Caller holds the key
    /// lock. A missing entry (deleted or evicted meanwhile) is a no-op.
    pub(crate) async fn flush_locked(&self, id: &DocumentId) -> DocacheResult<()> {
        let data = self.entries.get(id).map(|entry| entry.data().clone());
        if let Some(data) = data {
            self.store.upsert_item(&data).await?;
            EngineMetrics::incr(&self.metrics.flushes);
            tracing::debug!(id = %id, "Cache entry flushed to store");
        }
        Ok(())
    }

    /// Flush `id` with store panics turned into errors. Caller holds the
    /// key lock.
    async fn flush_contained(&self, id: &DocumentId) -> DocacheResult<()> {
        match AssertUnwindSafe(self.flush_locked(id)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(StoreError::backend("upsert_item", "flush panicked").into()),
        }
    }

    /// Take `id` off the queue and flush it, both under the key lock.
    ///
    /// Returns `false` when the ID was no longer queued, i.e. a delete or an
    /// expiry flush handled it first. On failure the ID is re-queued so the
    /// next cycle retries.
    async fn flush_queued(&self, id: DocumentId) -> DocacheResult<bool> {
        let _guard = self.locks.lock(&id).await;
        if self.pending.remove(&id).is_none() {
            return Ok(false);
        }

        if let Err(e) = self.flush_contained(&id).await {
            EngineMetrics::incr(&self.metrics.flush_errors);
            tracing::warn!(id = %id, error = %e, "Cache flush failed, will retry");
            if self.entries.contains_key(&id) {
                self.pending.insert(id.clone());
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Flush every currently queued ID concurrently and wait for all of them.
    ///
    /// Works on a snapshot of the queue; IDs queued after the snapshot wait
    /// for the next drain unless already in it. Returns the number of IDs
    /// flushed, or the first failure after the whole batch was attempted.
    pub(crate) async fn drain(&self) -> DocacheResult<usize> {
        let ids: Vec<DocumentId> = self.pending.iter().map(|id| id.key().clone()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let results = join_all(ids.into_iter().map(|id| self.flush_queued(id))).await;
        let mut flushed = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    // ========================================================================
    // EXPIRATION
    // ========================================================================

    /// Remove the entry for `id` if it has expired, flushing it first when it
    /// still has a pending write. Caller holds the key lock.
    ///
    /// Returns whether an entry was evicted. On flush failure, including a
    /// store panic, the entry is kept and stays queued.
    pub(crate) async fn evict_expired_locked(&self, id: &DocumentId) -> DocacheResult<bool> {
        let expired = self
            .entries
            .get(id)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if !expired {
            return Ok(false);
        }

        // Dequeue only once the write reached the store.
        if self.pending.contains(id) {
            self.flush_contained(id).await?;
            self.pending.remove(id);
        }

        let removed = self
            .entries
            .remove_if(id, |_, entry| entry.is_expired())
            .is_some();
        if removed {
            EngineMetrics::incr(&self.metrics.evictions);
            tracing::debug!(id = %id, "Expired cache entry removed");
        }
        Ok(removed)
    }

    /// Evict every expired entry. Failures are logged per item and do not
    /// stop the sweep.
    pub(crate) async fn sweep(&self) -> usize {
        let expired: Vec<DocumentId> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        if expired.is_empty() {
            return 0;
        }
        tracing::debug!(candidates = expired.len(), "Sweeping expired cache entries");

        let mut evicted = 0;
        for id in expired {
            let _guard = self.locks.lock(&id).await;
            match self.evict_expired_locked(&id).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    EngineMetrics::incr(&self.metrics.flush_errors);
                    tracing::warn!(id = %id, error = %e, "Failed to flush expiring entry");
                }
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, remaining = self.entries.len(), "Cache sweep completed");
        }
        evicted
    }
}
