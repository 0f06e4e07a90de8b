//! Document identity and content

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Canonical identifier of a stored document.
///
/// The backing store is the authority for ID assignment; the cache only
/// ever receives IDs that a store handed out (or that a caller already
/// knows from a previous read).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh timestamp-sortable identifier (UUIDv7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A document as seen by the cache: identity, type and an opaque content bag.
///
/// The cache never looks inside `content`; only merge policies and stores do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unset until the document is first persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    /// Classification fixed at construction.
    document_type: String,
    #[serde(default)]
    content: Map<String, Value>,
}

impl Document {
    /// Create an empty, not yet persisted document.
    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            id: None,
            document_type: document_type.into(),
            content: Map::new(),
        }
    }

    /// Builder-style ID assignment.
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }

    /// Assign the canonical ID returned by a store.
    pub fn set_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.content
    }

    /// Look up a single content field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Look up a content field holding a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    /// Set a content field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.content.insert(key.into(), value.into())
    }

    /// Remove a content field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.content.remove(key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
