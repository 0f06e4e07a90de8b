//! Write-back cache engine.
//!
//! Routes every storage operation through an in-memory cache map. Creates
//! and deletes are written through to the store; upserts and replaces are
//! staged in the cache and written back later by the maintenance loop.

use std::sync::Arc;

use async_trait::async_trait;
use docache_core::constants::KEY_LOCK_STRIPES;
use docache_core::{CacheConfig, DocacheError, DocacheResult, Document, DocumentId, StoreError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::maintenance;
use super::shared::EngineCore;
use super::stats::{CacheStats, EngineMetrics};
use crate::merge::{BypassMerge, MergePolicy};
use crate::store::BackingStore;

/// Write-back cache in front of a [`BackingStore`].
///
/// # Type Parameters
///
/// - `S`: The backing store being fronted
/// - `P`: The merge policy applied by upserts (default: [`BypassMerge`])
///
/// # Consistency
///
/// - Reads are served from memory while an entry is live.
/// - All mutations of one ID are serialized, so concurrent upserts never
///   lose a merge and a pending flush never resurrects a deleted document.
/// - Upsert and replace succeed once the cache entry is installed. A store
///   failure during the later flush is not reported to that caller; it is
///   logged, counted in [`CacheStats::flush_errors`] and retried.
/// - Search drains the write-back queue first and patches results with any
///   newer cached data.
///
/// # Lifecycle
///
/// Construction spawns the maintenance loop on the current tokio runtime;
/// an enabled engine built outside a runtime fails with
/// [`DocacheError::NoRuntime`](docache_core::DocacheError::NoRuntime).
///
/// [`CacheEngine::shutdown`] is the only release path that waits: it stops
/// the loop, awaits its termination and flushes what is left before
/// returning. Dropping the engine merely signals the loop. The loop still
/// runs a final flush, but nothing waits for it, and writes are lost if the
/// runtime itself goes away first.
///
/// # Example
///
/// ```ignore
/// let engine = CacheEngine::new(store, CacheConfig::default())?;
/// let id = engine.create_item(&Document::new("note")).await?;
/// let doc = engine.read_item_by_id(&id).await?; // served from memory
/// engine.shutdown().await?;
/// ```
pub struct CacheEngine<S, P = BypassMerge>
where
    S: BackingStore + 'static,
    P: MergePolicy + 'static,
{
    core: Arc<EngineCore<S, P>>,
    shutdown_tx: watch::Sender<bool>,
    maintenance: Option<JoinHandle<()>>,
}

impl<S> CacheEngine<S, BypassMerge>
where
    S: BackingStore + 'static,
{
    /// Create an engine with the default full-replace merge policy.
    pub fn new(store: S, config: CacheConfig) -> DocacheResult<Self> {
        Self::with_policy(store, BypassMerge, config)
    }
}

impl<S, P> CacheEngine<S, P>
where
    S: BackingStore + 'static,
    P: MergePolicy + 'static,
{
    /// Create an engine with a custom merge policy.
    ///
    /// Must be called from within a tokio runtime when caching is enabled.
    /// Fails on an invalid config or a missing runtime.
    pub fn with_policy(store: S, policy: P, config: CacheConfig) -> DocacheResult<Self> {
        config.validate()?;

        let enabled = config.enabled;
        let core = Arc::new(EngineCore::new(store, policy, config, KEY_LOCK_STRIPES));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let maintenance = if enabled {
            let runtime = Handle::try_current().map_err(|e| DocacheError::NoRuntime {
                reason: e.to_string(),
            })?;
            Some(runtime.spawn(maintenance::supervise(Arc::clone(&core), shutdown_rx)))
        } else {
            tracing::info!("Cache disabled, operations pass through to the store");
            None
        };

        Ok(Self {
            core,
            shutdown_tx,
            maintenance,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.core.config
    }

    /// The fronted store. Reads through it bypass the cache.
    pub fn store(&self) -> &S {
        &self.core.store
    }

    fn enabled(&self) -> bool {
        self.core.config.enabled
    }

    /// Whether a live entry is cached for `id`.
    pub fn is_cached(&self, id: &DocumentId) -> bool {
        self.core.live(id).is_some()
    }

    /// Whether `id` has a write waiting to be flushed.
    pub fn is_pending(&self, id: &DocumentId) -> bool {
        self.core.pending.contains(id)
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    /// Flush every pending write now and wait for completion.
    ///
    /// Returns the number of IDs flushed, or the first store failure after
    /// the whole batch was attempted.
    pub async fn flush(&self) -> DocacheResult<usize> {
        if !self.enabled() {
            return Ok(0);
        }
        self.core.drain().await
    }

    /// Stop the maintenance loop, wait for it, flush what is left and drop
    /// the cache map.
    pub async fn shutdown(mut self) -> DocacheResult<()> {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.maintenance.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Cache maintenance task failed during shutdown");
            }
        }

        if self.enabled() {
            self.core.drain().await?;
            self.core.entries.clear();
        }

        tracing::info!("Cache engine shut down");
        Ok(())
    }

    /// Write-through create: the store assigns the ID, then the result is
    /// cached.
    async fn create_cached(&self, doc: &Document) -> DocacheResult<DocumentId> {
        let id = self.core.store.create_item(doc).await?;
        let mut created = doc.clone();
        created.set_id(id.clone());
        self.core.install(&id, created);
        tracing::debug!(id = %id, "Document created and cached");
        Ok(id)
    }

    /// Merge `incoming` against current truth without a cache.
    async fn merge_uncached(&self, id: &DocumentId, incoming: &Document) -> DocacheResult<Document> {
        let merged = match self.core.store.read_item_by_id(id).await? {
            Some(stored) => self.core.policy.resolve(&stored, incoming),
            None => incoming.clone(),
        };
        Ok(with_id(merged, id))
    }
}

fn with_id(mut doc: Document, id: &DocumentId) -> Document {
    doc.set_id(id.clone());
    doc
}

#[async_trait]
impl<S, P> BackingStore for CacheEngine<S, P>
where
    S: BackingStore + 'static,
    P: MergePolicy + 'static,
{
    async fn create_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        if !self.enabled() {
            return self.core.store.create_item(doc).await;
        }
        self.create_cached(doc).await
    }

    async fn read_item_by_id(&self, id: &DocumentId) -> DocacheResult<Option<Document>> {
        if !self.enabled() {
            return self.core.store.read_item_by_id(id).await;
        }

        let core = &self.core;
        if let Some(data) = core.live(id) {
            EngineMetrics::incr(&core.metrics.hits);
            tracing::debug!(id = %id, "Cache hit");
            return Ok(Some(data));
        }

        let _guard = core.locks.lock(id).await;
        // Populated by a concurrent writer while we waited.
        if let Some(data) = core.live(id) {
            EngineMetrics::incr(&core.metrics.hits);
            return Ok(Some(data));
        }

        EngineMetrics::incr(&core.metrics.misses);
        tracing::debug!(id = %id, "Cache miss");
        core.evict_expired_locked(id).await?;

        match core.store.read_item_by_id(id).await? {
            Some(doc) => {
                core.install(id, doc.clone());
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    async fn upsert_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        let Some(id) = doc.id().cloned() else {
            return self.create_item(doc).await;
        };

        if !self.enabled() {
            let merged = self.merge_uncached(&id, doc).await?;
            return self.core.store.upsert_item(&merged).await;
        }

        let core = &self.core;
        let _guard = core.locks.lock(&id).await;
        let merged = match core.live(&id) {
            Some(cached) => with_id(core.policy.resolve(&cached, doc), &id),
            None => {
                // An expired entry may still hold an unflushed write.
                core.evict_expired_locked(&id).await?;
                self.merge_uncached(&id, doc).await?
            }
        };

        core.stage(&id, merged);
        tracing::debug!(id = %id, "Upsert staged for write-back");
        Ok(id)
    }

    async fn replace_item(&self, doc: &Document) -> DocacheResult<()> {
        if !self.enabled() {
            return self.core.store.replace_item(doc).await;
        }

        let id = doc
            .id()
            .cloned()
            .ok_or_else(|| StoreError::missing_id("replace_item"))?;

        let _guard = self.core.locks.lock(&id).await;
        self.core.stage(&id, doc.clone());
        tracing::debug!(id = %id, "Replace staged for write-back");
        Ok(())
    }

    async fn delete_item(&self, id: &DocumentId) -> DocacheResult<()> {
        if self.enabled() {
            let _guard = self.core.locks.lock(id).await;
            // Dequeue before removing the entry so no flush can write it back.
            self.core.pending.remove(id);
            self.core.entries.remove(id);
            self.core.store.delete_item(id).await?;
            tracing::debug!(id = %id, "Document deleted");
            return Ok(());
        }
        self.core.store.delete_item(id).await
    }

    async fn search(&self, query: &str, order_by: Option<&str>) -> DocacheResult<Vec<Document>> {
        if !self.enabled() {
            return self.core.store.search(query, order_by).await;
        }

        let flushed = self.core.drain().await?;
        tracing::debug!(flushed, "Write-back queue drained before search");

        let documents = self.core.store.search(query, order_by).await?;

        // Writes landing between the drain and the store read are patched in.
        Ok(documents
            .into_iter()
            .map(|doc| {
                doc.id()
                    .and_then(|id| self.core.live(id))
                    .unwrap_or(doc)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::merge::FieldMerge;
    use std::time::Duration;

    fn config() -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(60))
            .with_flush_interval(Duration::from_secs(1))
            .with_sweep_interval(Duration::from_secs(30))
    }

    fn engine() -> CacheEngine<Arc<InMemoryStore>> {
        CacheEngine::new(Arc::new(InMemoryStore::new()), config()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_is_write_through() {
        let engine = engine();
        let id = engine
            .create_item(&Document::new("note").with_field("f", "x"))
            .await
            .unwrap();

        assert!(engine.store().peek(&id).is_some());
        assert!(engine.is_cached(&id));
        assert!(!engine.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_create_is_a_hit() {
        let engine = engine();
        let id = engine
            .create_item(&Document::new("note").with_field("f", "x"))
            .await
            .unwrap();

        let doc = engine.read_item_by_id(&id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("f"), Some("x"));
        assert_eq!(engine.store().calls().reads, 0);
        assert_eq!(engine.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_miss_populates_cache() {
        let engine = engine();
        let id = engine
            .store()
            .seed(Document::new("note").with_field("f", "stored"))
            .unwrap();

        let first = engine.read_item_by_id(&id).await.unwrap().unwrap();
        let second = engine.read_item_by_id(&id).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.store().calls().reads, 1);
        assert!(!engine.is_pending(&id));
        let stats = engine.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_does_not_cache() {
        let engine = engine();
        let id = DocumentId::new("ghost");

        assert!(engine.read_item_by_id(&id).await.unwrap().is_none());
        assert!(!engine.is_cached(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_without_id_creates() {
        let engine = engine();
        let id = engine
            .upsert_item(&Document::new("note").with_field("f", "x"))
            .await
            .unwrap();

        assert!(engine.store().peek(&id).is_some());
        assert!(!engine.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_with_id_is_deferred() {
        let engine = engine();
        let id = engine
            .create_item(&Document::new("note").with_field("f", "x"))
            .await
            .unwrap();

        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("f", "y"))
            .await
            .unwrap();

        assert!(engine.is_pending(&id));
        assert_eq!(engine.store().peek(&id).unwrap().get_str("f"), Some("x"));

        assert_eq!(engine.flush().await.unwrap(), 1);
        assert_eq!(engine.store().peek(&id).unwrap().get_str("f"), Some("y"));
        assert!(!engine.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_miss_merges_against_store() {
        let store = Arc::new(InMemoryStore::new());
        let id = store
            .seed(Document::new("note").with_field("a", "1").with_field("b", "2"))
            .unwrap();
        let engine = CacheEngine::with_policy(Arc::clone(&store), FieldMerge, config()).unwrap();

        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("b", "3"))
            .await
            .unwrap();

        let doc = engine.read_item_by_id(&id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("a"), Some("1"));
        assert_eq!(doc.get_str("b"), Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_unknown_id_takes_incoming() {
        let engine = engine();
        let id = DocumentId::new("fresh");
        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("f", "new"))
            .await
            .unwrap();

        engine.flush().await.unwrap();
        assert_eq!(engine.store().peek(&id).unwrap().get_str("f"), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_requires_id() {
        let engine = engine();
        let result = engine.replace_item(&Document::new("note")).await;
        assert!(matches!(
            result,
            Err(docache_core::DocacheError::Store(StoreError::MissingId { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_drops_removed_fields() {
        let engine = engine();
        let id = engine
            .create_item(&Document::new("note").with_field("a", "1").with_field("b", "2"))
            .await
            .unwrap();

        engine
            .replace_item(&Document::new("note").with_id(id.clone()).with_field("a", "9"))
            .await
            .unwrap();

        let doc = engine.read_item_by_id(&id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("a"), Some("9"));
        assert!(doc.get("b").is_none());
        assert!(engine.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_pending_flush() {
        let engine = engine();
        let id = engine.create_item(&Document::new("note")).await.unwrap();
        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("f", "y"))
            .await
            .unwrap();

        engine.delete_item(&id).await.unwrap();

        assert!(!engine.is_pending(&id));
        assert!(!engine.is_cached(&id));
        assert_eq!(engine.flush().await.unwrap(), 0);
        assert!(engine.store().peek(&id).is_none());
        assert!(engine.read_item_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_falls_through_and_repopulates() {
        let store = Arc::new(InMemoryStore::new());
        let engine = CacheEngine::new(
            Arc::clone(&store),
            config().with_ttl(Duration::from_secs(5)),
        )
        .unwrap();
        let id = engine.create_item(&Document::new("note")).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!engine.is_cached(&id));

        engine.read_item_by_id(&id).await.unwrap().unwrap();
        assert_eq!(store.calls().reads, 1);
        assert!(engine.is_cached(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_pending_entry_is_flushed_before_fallthrough() {
        let store = Arc::new(InMemoryStore::new());
        let engine = CacheEngine::new(
            Arc::clone(&store),
            config()
                .with_ttl(Duration::from_secs(5))
                .with_flush_interval(Duration::from_secs(3600)),
        )
        .unwrap();
        let id = engine.create_item(&Document::new("note")).await.unwrap();
        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("f", "y"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        let doc = engine.read_item_by_id(&id).await.unwrap().unwrap();

        assert_eq!(doc.get_str("f"), Some("y"));
        assert_eq!(store.peek(&id).unwrap().get_str("f"), Some("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_read_is_not_implemented() {
        let engine = engine();
        let err = engine
            .read_item_by_predicate(&|_: &Document| true)
            .await
            .unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[tokio::test]
    async fn test_disabled_engine_passes_through() {
        let store = Arc::new(InMemoryStore::new());
        let engine = CacheEngine::new(Arc::clone(&store), CacheConfig::disabled()).unwrap();

        let id = engine.create_item(&Document::new("note")).await.unwrap();
        assert!(!engine.is_cached(&id));

        engine
            .upsert_item(&Document::new("note").with_id(id.clone()).with_field("f", "y"))
            .await
            .unwrap();
        assert_eq!(store.peek(&id).unwrap().get_str("f"), Some("y"));

        engine.read_item_by_id(&id).await.unwrap();
        engine.read_item_by_id(&id).await.unwrap();
        assert_eq!(store.calls().reads, 3);

        engine.shutdown().await.unwrap();
    }

    #[test]
    fn test_enabled_engine_requires_runtime() {
        let result = CacheEngine::new(InMemoryStore::new(), config());
        assert!(matches!(
            result,
            Err(docache_core::DocacheError::NoRuntime { .. })
        ));
    }

    #[test]
    fn test_disabled_engine_needs_no_runtime() {
        assert!(CacheEngine::new(InMemoryStore::new(), CacheConfig::disabled()).is_ok());
    }

    #[test]
    fn test_overflowing_ttl_is_rejected() {
        let result = CacheEngine::new(
            InMemoryStore::new(),
            CacheConfig::disabled().with_ttl(Duration::from_secs(u64::MAX)),
        );
        assert!(matches!(
            result,
            Err(docache_core::DocacheError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = CacheEngine::new(
            InMemoryStore::new(),
            CacheConfig::disabled().with_ttl(Duration::ZERO),
        );
        assert!(result.is_err());
    }
}
