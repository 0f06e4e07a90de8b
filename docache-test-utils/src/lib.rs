//! docache Test Utilities
//!
//! Centralized test infrastructure for the docache workspace:
//! - Fault-injecting store wrapper
//! - Proptest generators for documents
//! - Test fixtures for common scenarios
//! - Custom assertions for docache-specific errors
//! - Tracing setup for tests

// Re-export the reference store from its source crate
pub use docache_storage::{InMemoryStore, StoreCalls};

// Re-export core types for convenience
pub use docache_core::{
    CacheConfig, ConfigError, DocacheError, DocacheResult, Document, DocumentId, StoreError,
};
pub use docache_storage::{
    BackingStore, BypassMerge, CacheEngine, CacheStats, DocumentPredicate, FieldMerge,
    MergePolicy,
};

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `docache_storage=debug`. Safe to call
/// from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docache_storage=debug,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Store wrapper that fails or panics on demand.
///
/// Everything not explicitly sabotaged is delegated to an [`InMemoryStore`].
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing_upserts: Mutex<HashSet<DocumentId>>,
    panicking_upserts: Mutex<HashSet<DocumentId>>,
    stale_search: Mutex<Option<Vec<Document>>>,
    fail_searches: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store; reads through it bypass any engine.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Make every upsert of `id` fail until [`FlakyStore::heal`] is called.
    pub fn fail_upserts_for(&self, id: &DocumentId) {
        if let Ok(mut failing) = self.failing_upserts.lock() {
            failing.insert(id.clone());
        }
    }

    /// Stop failing upserts of `id`.
    pub fn heal(&self, id: &DocumentId) {
        if let Ok(mut failing) = self.failing_upserts.lock() {
            failing.remove(id);
        }
    }

    /// Panic on the next upsert of `id` only.
    pub fn panic_once_on_upsert(&self, id: &DocumentId) {
        if let Ok(mut panicking) = self.panicking_upserts.lock() {
            panicking.insert(id.clone());
        }
    }

    /// Answer the next search with `documents` verbatim, as a lagging
    /// replica would, ignoring the query.
    pub fn serve_stale_search(&self, documents: Vec<Document>) {
        if let Ok(mut stale) = self.stale_search.lock() {
            *stale = Some(documents);
        }
    }

    pub fn set_fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn should_fail_upsert(&self, id: &DocumentId) -> bool {
        self.failing_upserts
            .lock()
            .map(|failing| failing.contains(id))
            .unwrap_or(false)
    }

    fn take_panic(&self, id: &DocumentId) -> bool {
        self.panicking_upserts
            .lock()
            .map(|mut panicking| panicking.remove(id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BackingStore for FlakyStore {
    async fn create_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        self.inner.create_item(doc).await
    }

    async fn read_item_by_id(&self, id: &DocumentId) -> DocacheResult<Option<Document>> {
        self.inner.read_item_by_id(id).await
    }

    async fn upsert_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        if let Some(id) = doc.id() {
            if self.take_panic(id) {
                panic!("injected upsert panic for {id}");
            }
            if self.should_fail_upsert(id) {
                let reason = format!("injected failure for {id}");
                return Err(StoreError::backend("upsert_item", reason).into());
            }
        }
        self.inner.upsert_item(doc).await
    }

    async fn replace_item(&self, doc: &Document) -> DocacheResult<()> {
        self.inner.replace_item(doc).await
    }

    async fn delete_item(&self, id: &DocumentId) -> DocacheResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("delete_item", "injected failure").into());
        }
        self.inner.delete_item(id).await
    }

    async fn search(&self, query: &str, order_by: Option<&str>) -> DocacheResult<Vec<Document>> {
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(StoreError::backend("search", "injected failure").into());
        }
        let stale = self.stale_search.lock().ok().and_then(|mut stale| stale.take());
        if let Some(documents) = stale {
            return Ok(documents);
        }
        self.inner.search(query, order_by).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating documents.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Generate a document ID.
    pub fn arb_document_id() -> impl Strategy<Value = DocumentId> {
        "[a-z0-9]{8}".prop_map(DocumentId::new)
    }

    /// Generate a content field name.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,11}"
    }

    /// Generate a scalar JSON value.
    pub fn arb_field_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,24}".prop_map(Value::from),
        ]
    }

    /// Generate a content bag of up to `max_fields` fields.
    pub fn arb_content(max_fields: usize) -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map(arb_field_name(), arb_field_value(), 0..=max_fields)
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// Generate a not yet persisted document of the given type.
    pub fn arb_document(document_type: &'static str) -> impl Strategy<Value = Document> {
        arb_content(8).prop_map(move |content| {
            let mut doc = Document::new(document_type);
            *doc.content_mut() = content;
            doc
        })
    }

    /// Generate a document carrying an ID.
    pub fn arb_identified_document(document_type: &'static str) -> impl Strategy<Value = Document> {
        (arb_document_id(), arb_document(document_type)).prop_map(|(id, doc)| doc.with_id(id))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Document type used by fixture documents.
    pub const TEST_DOCUMENT_TYPE: &str = "TestDocument";

    /// Cache config with short intervals suited to a paused test clock.
    pub fn fast_config() -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(60))
            .with_flush_interval(Duration::from_millis(100))
            .with_sweep_interval(Duration::from_secs(1))
    }

    /// A fixture document with a single `testData` field.
    pub fn test_document(value: &str) -> Document {
        Document::new(TEST_DOCUMENT_TYPE).with_field("testData", value)
    }

    /// A multi-field profile document.
    pub fn profile(name: &str, city: &str, age: i64) -> Document {
        Document::new("profile")
            .with_field("name", name)
            .with_field("city", city)
            .with_field("age", age)
    }

    /// Search query matching every fixture document.
    pub fn test_document_query() -> String {
        format!("documentType eq '{}'", TEST_DOCUMENT_TYPE)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for docache-specific validation.

    use super::*;

    /// Assert that a DocacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DocacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a DocacheResult is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &DocacheResult<T>) {
        match result {
            Err(DocacheError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    /// Assert that a DocacheResult is a NotImplemented error.
    #[track_caller]
    pub fn assert_not_implemented<T: std::fmt::Debug>(result: &DocacheResult<T>) {
        match result {
            Err(DocacheError::NotImplemented { .. }) => {}
            other => panic!("Expected NotImplemented error, got: {:?}", other),
        }
    }

    /// Assert that a document carries `value` under `field`.
    #[track_caller]
    pub fn assert_field(doc: &Document, field: &str, value: &str) {
        assert_eq!(
            doc.get_str(field),
            Some(value),
            "field {field:?} of {:?}",
            doc.id()
        );
    }
}
