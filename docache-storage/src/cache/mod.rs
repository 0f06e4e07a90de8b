//! Write-back cache layer.
//!
//! The [`CacheEngine`] fronts a [`BackingStore`](crate::BackingStore) with
//! an in-memory map of [`CacheEntry`] snapshots and a write-back queue of
//! IDs whose latest snapshot has not reached the store yet.
//!
//! # Write paths
//!
//! - **Write-through**: create and delete hit the store before returning.
//! - **Write-back**: upsert (with an ID) and replace only update the cache
//!   and enqueue the ID; the maintenance loop flushes it later.
//!
//! # Example
//!
//! ```ignore
//! let engine = CacheEngine::with_policy(store, FieldMerge, CacheConfig::from_env())?;
//!
//! let id = engine.create_item(&Document::new("profile").with_field("name", "Ada")).await?;
//! engine
//!     .upsert_item(&Document::new("profile").with_id(id.clone()).with_field("city", "London"))
//!     .await?;
//!
//! // Search drains pending writes first, so it sees the upsert.
//! let results = engine.search("documentType eq 'profile'", None).await?;
//! ```

mod shared;
pub mod engine;
pub mod entry;
mod key_lock;
mod maintenance;
pub mod stats;

pub use engine::CacheEngine;
pub use entry::CacheEntry;
pub use stats::CacheStats;
