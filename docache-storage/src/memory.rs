//! In-memory reference store.
//!
//! Satisfies the [`BackingStore`] contract with a plain map and can simulate
//! a slow remote store through a fixed per-call latency.

use crate::store::BackingStore;
use async_trait::async_trait;
use docache_core::{DocacheResult, Document, DocumentId, StoreError};
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Per-operation call counters.
#[derive(Debug, Default)]
struct CallCounters {
    creates: AtomicU64,
    reads: AtomicU64,
    upserts: AtomicU64,
    replaces: AtomicU64,
    deletes: AtomicU64,
    searches: AtomicU64,
}

/// Snapshot of [`InMemoryStore`] call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub creates: u64,
    pub reads: u64,
    pub upserts: u64,
    pub replaces: u64,
    pub deletes: u64,
    pub searches: u64,
}

impl StoreCalls {
    /// Number of calls that wrote to the store.
    pub fn writes(&self) -> u64 {
        self.creates + self.upserts + self.replaces
    }
}

/// In-memory document store.
///
/// Search understands a tiny query language, enough for tests:
/// an empty query or `*` matches everything, otherwise clauses of the form
/// `field eq 'value'` joined by `and`. `id` and `documentType` address the
/// document identity and type; any other field addresses content.
/// `order_by` is a field name optionally followed by `asc` or `desc`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
    latency: Duration,
    calls: CallCounters,
}

impl InMemoryStore {
    /// Create an empty store with no simulated latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sleeps `latency` on every call.
    ///
    /// Search sleeps `latency` once per stored document.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Read a document without latency or call accounting.
    pub fn peek(&self, id: &DocumentId) -> Option<Document> {
        self.documents.read().ok()?.get(id).cloned()
    }

    /// Insert a document directly, bypassing latency and accounting.
    pub fn seed(&self, doc: Document) -> DocacheResult<DocumentId> {
        let id = doc.id().cloned().unwrap_or_else(DocumentId::generate);
        let mut doc = doc;
        doc.set_id(id.clone());
        self.write()?.insert(id.clone(), doc);
        Ok(id)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            creates: self.calls.creates.load(Ordering::Relaxed),
            reads: self.calls.reads.load(Ordering::Relaxed),
            upserts: self.calls.upserts.load(Ordering::Relaxed),
            replaces: self.calls.replaces.load(Ordering::Relaxed),
            deletes: self.calls.deletes.load(Ordering::Relaxed),
            searches: self.calls.searches.load(Ordering::Relaxed),
        }
    }

    async fn delay(&self, times: u32) {
        if !self.latency.is_zero() && times > 0 {
            tokio::time::sleep(self.latency * times).await;
        }
    }

    fn read(&self) -> DocacheResult<std::sync::RwLockReadGuard<'_, HashMap<DocumentId, Document>>> {
        self.documents
            .read()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    fn write(
        &self,
    ) -> DocacheResult<std::sync::RwLockWriteGuard<'_, HashMap<DocumentId, Document>>> {
        self.documents
            .write()
            .map_err(|_| StoreError::LockPoisoned.into())
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn create_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        self.calls.creates.fetch_add(1, Ordering::Relaxed);
        self.delay(1).await;

        let id = doc.id().cloned().unwrap_or_else(DocumentId::generate);
        let mut documents = self.write()?;
        if documents.contains_key(&id) {
            return Err(StoreError::InsertFailed {
                id,
                reason: "already exists".to_string(),
            }
            .into());
        }
        let mut stored = doc.clone();
        stored.set_id(id.clone());
        documents.insert(id.clone(), stored);
        Ok(id)
    }

    async fn read_item_by_id(&self, id: &DocumentId) -> DocacheResult<Option<Document>> {
        self.calls.reads.fetch_add(1, Ordering::Relaxed);
        self.delay(1).await;
        Ok(self.read()?.get(id).cloned())
    }

    async fn upsert_item(&self, doc: &Document) -> DocacheResult<DocumentId> {
        self.calls.upserts.fetch_add(1, Ordering::Relaxed);
        self.delay(1).await;

        let id = doc.id().cloned().unwrap_or_else(DocumentId::generate);
        let mut stored = doc.clone();
        stored.set_id(id.clone());
        self.write()?.insert(id.clone(), stored);
        Ok(id)
    }

    async fn replace_item(&self, doc: &Document) -> DocacheResult<()> {
        self.calls.replaces.fetch_add(1, Ordering::Relaxed);
        self.delay(1).await;

        let id = doc
            .id()
            .cloned()
            .ok_or_else(|| StoreError::missing_id("replace_item"))?;
        let mut documents = self.write()?;
        match documents.get_mut(&id) {
            Some(existing) => {
                *existing = doc.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { id }.into()),
        }
    }

    async fn delete_item(&self, id: &DocumentId) -> DocacheResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::Relaxed);
        self.delay(1).await;
        self.write()?.remove(id);
        Ok(())
    }

    async fn search(&self, query: &str, order_by: Option<&str>) -> DocacheResult<Vec<Document>> {
        self.calls.searches.fetch_add(1, Ordering::Relaxed);
        let count = u32::try_from(self.len()).unwrap_or(u32::MAX);
        self.delay(count).await;

        let clauses = parse_query(query)?;
        let mut results: Vec<Document> = self
            .read()?
            .values()
            .filter(|doc| clauses.iter().all(|clause| clause.matches(doc)))
            .cloned()
            .collect();

        match order_by.map(str::trim).filter(|o| !o.is_empty()) {
            Some(order) => {
                let (field, descending) = parse_order(order)?;
                results.sort_by(|a, b| {
                    let ordering = compare_field(a, b, &field);
                    if descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
            None => results.sort_by(|a, b| a.id().cmp(&b.id())),
        }

        Ok(results)
    }
}

// ============================================================================
// QUERY EVALUATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    field: String,
    value: String,
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        match field_value(doc, &self.field) {
            Some(Value::String(s)) => s == self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

fn field_value(doc: &Document, field: &str) -> Option<Value> {
    match field {
        "id" => doc.id().map(|id| Value::String(id.to_string())),
        "documentType" | "document_type" => Some(Value::String(doc.document_type().to_string())),
        other => doc.get(other).cloned(),
    }
}

fn parse_query(query: &str) -> DocacheResult<Vec<Clause>> {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return Ok(Vec::new());
    }

    query
        .split(" and ")
        .map(|clause| parse_clause(query, clause.trim()))
        .collect()
}

fn parse_clause(query: &str, clause: &str) -> DocacheResult<Clause> {
    let invalid = |reason: &str| StoreError::InvalidQuery {
        query: query.to_string(),
        reason: reason.to_string(),
    };

    let (field, rest) = clause
        .split_once(" eq ")
        .ok_or_else(|| invalid("expected `field eq 'value'`"))?;
    let value = rest
        .trim()
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .ok_or_else(|| invalid("value must be single-quoted"))?;

    Ok(Clause {
        field: field.trim().to_string(),
        value: value.to_string(),
    })
}

fn parse_order(order: &str) -> DocacheResult<(String, bool)> {
    let mut parts = order.split_whitespace();
    let field = parts.next().unwrap_or_default().to_string();
    let descending = match parts.next().map(str::to_lowercase).as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => {
            return Err(StoreError::InvalidQuery {
                query: order.to_string(),
                reason: format!("unknown sort direction {other}"),
            }
            .into())
        }
    };
    Ok((field, descending))
}

fn compare_field(a: &Document, b: &Document, field: &str) -> CmpOrdering {
    let key = |doc: &Document| {
        field_value(doc, field).map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    };
    key(a).cmp(&key(b))
}
