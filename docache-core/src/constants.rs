//! Default values and environment variable names.

/// Default time-to-live for a cache entry, in seconds.
pub const DEFAULT_ENTRY_TTL_SECS: u64 = 300;

/// Default pause between two maintenance cycles, in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;

/// Minimum time between two expiration sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Upper bound accepted for any configured duration (ten years), in seconds.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Number of striped per-key locks held by an engine.
pub const KEY_LOCK_STRIPES: usize = 64;

pub const ENV_ENABLED: &str = "DOCACHE_ENABLED";
pub const ENV_ENTRY_TTL_SECS: &str = "DOCACHE_ENTRY_TTL_SECS";
pub const ENV_FLUSH_INTERVAL_MS: &str = "DOCACHE_FLUSH_INTERVAL_MS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "DOCACHE_SWEEP_INTERVAL_SECS";
