//! Merge policies resolving an incoming update against known state.

use docache_core::Document;

/// Resolves a partial or full update against the currently known document.
///
/// Must be total: any two documents sharing an ID produce a document.
pub trait MergePolicy: Send + Sync {
    fn resolve(&self, original: &Document, incoming: &Document) -> Document;
}

/// Last writer wins: the incoming document replaces the original entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassMerge;

impl MergePolicy for BypassMerge {
    fn resolve(&self, _original: &Document, incoming: &Document) -> Document {
        incoming.clone()
    }
}

/// Shallow field-level merge.
///
/// Starts from the original document and overwrites every top-level content
/// key present in the incoming one. Keys absent from the incoming document
/// keep their original value. The original `document_type` is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMerge;

impl MergePolicy for FieldMerge {
    fn resolve(&self, original: &Document, incoming: &Document) -> Document {
        let mut merged = original.clone();
        if let Some(id) = incoming.id() {
            merged.set_id(id.clone());
        }
        for (key, value) in incoming.content() {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl<F> MergePolicy for F
where
    F: Fn(&Document, &Document) -> Document + Send + Sync,
{
    fn resolve(&self, original: &Document, incoming: &Document) -> Document {
        self(original, incoming)
    }
}
