//! docache Core - Document, Error and Configuration Types
//!
//! Pure data structures shared by every other crate in the workspace.
//! The cache engine and the storage contract live in `docache-storage`.

pub mod config;
pub mod constants;
pub mod document;
pub mod error;

pub use config::CacheConfig;
pub use document::{Document, DocumentId};
pub use error::{ConfigError, DocacheError, DocacheResult, StoreError};
