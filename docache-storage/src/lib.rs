//! docache Storage - Storage Contract and Write-Back Cache
//!
//! Defines the [`BackingStore`] contract, the pluggable [`MergePolicy`]
//! seam, an [`InMemoryStore`] reference implementation, and the
//! [`CacheEngine`] that fronts any store with a write-back cache.

pub mod cache;
pub mod memory;
pub mod merge;
pub mod store;

pub use cache::{CacheEngine, CacheEntry, CacheStats};
pub use memory::{InMemoryStore, StoreCalls};
pub use merge::{BypassMerge, FieldMerge, MergePolicy};
pub use store::{BackingStore, DocumentPredicate};

// Re-export core types used throughout the public API
pub use docache_core::{
    CacheConfig, ConfigError, DocacheError, DocacheResult, Document, DocumentId, StoreError,
};
