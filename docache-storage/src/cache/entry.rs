//! Cache entries.

use docache_core::{Document, DocumentId};
use std::time::Duration;
use tokio::time::Instant;

/// Roughly thirty years.
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Snapshot of a document plus its absolute expiration instant.
///
/// Entries are immutable: every write builds a new one, so a flush reading
/// an entry never observes a half-applied update.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    id: DocumentId,
    data: Document,
    expires_at: Instant,
}

impl CacheEntry {
    /// Build an entry expiring `ttl` from now. A TTL too large for the
    /// clock saturates to a far-future instant.
    pub fn new(id: DocumentId, data: Document, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS));
        Self {
            id,
            data,
            expires_at,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}
