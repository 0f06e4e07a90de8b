//! Backing store contract.
//!
//! The cache engine fronts anything implementing [`BackingStore`] and
//! implements the trait itself, so an engine can stand in wherever a store
//! is expected.

use async_trait::async_trait;
use docache_core::{DocacheError, DocacheResult, Document, DocumentId};
use std::sync::Arc;

/// Predicate over documents, reserved for typed queries.
pub type DocumentPredicate = dyn Fn(&Document) -> bool + Send + Sync;

/// Async storage contract for documents.
///
/// Implementations are expected to be slow relative to memory access; the
/// cache engine exists to hide that latency.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Persist a new document and return its canonical ID.
    ///
    /// The store is the authority for ID assignment.
    async fn create_item(&self, doc: &Document) -> DocacheResult<DocumentId>;

    /// Get a document by ID. A missing document is `Ok(None)`, not an error.
    async fn read_item_by_id(&self, id: &DocumentId) -> DocacheResult<Option<Document>>;

    /// Create the document if absent, otherwise overwrite it entirely.
    async fn upsert_item(&self, doc: &Document) -> DocacheResult<DocumentId>;

    /// Overwrite an existing document entirely.
    async fn replace_item(&self, doc: &Document) -> DocacheResult<()>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete_item(&self, id: &DocumentId) -> DocacheResult<()>;

    /// Run a store-specific query.
    ///
    /// `query` and `order_by` are passed through verbatim; their syntax is
    /// defined by the store, never by the cache.
    async fn search(&self, query: &str, order_by: Option<&str>) -> DocacheResult<Vec<Document>>;

    /// Find the first document matching a predicate.
    ///
    /// Reserved for typed queries and not implemented by any store in this
    /// workspace; the default body fails with `NotImplemented` instead of
    /// degrading to a full scan.
    async fn read_item_by_predicate(
        &self,
        _predicate: &DocumentPredicate,
    ) -> DocacheResult<Option<Document>> {
        Err(DocacheError::not_implemented("read_item_by_predicate"))
    }
}

#[async_trait]
impl<S> BackingStore for Arc<S>
where
    S: BackingStore + ?Sized,
{
    async fn create_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        (**self).create_item(doc).await
    }

    async fn read_item_by_id(&self, id: &DocumentId) -> DocacheResult<Option<Document>> {
        (**self).read_item_by_id(id).await
    }

    async fn upsert_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        (**self).upsert_item(doc).await
    }

    async fn replace_item(&self, doc: &Document) -> DocacheResult<()> {
        (**self).replace_item(doc).await
    }

    async fn delete_item(&self, id: &DocumentId) -> DocacheResult<()> {
        (**self).delete_item(id).await
    }

    async fn search(&self, query: &str, order_by: Option<&str>) -> DocacheResult<Vec<Document>> {
        (**self).search(query, order_by).await
    }

    async fn read_item_by_predicate(
        &self,
        predicate: &DocumentPredicate,
    ) -> DocacheResult<Option<Document>> {
        (**self).read_item_by_predicate(predicate).await
    }
}
