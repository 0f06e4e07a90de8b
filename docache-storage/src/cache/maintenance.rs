//! Maintenance loop: periodic write-back flush and expiration sweep.
//!
//! One loop runs per enabled engine. Each cycle:
//!
//! 1. Drains the write-back queue, flushing every queued ID concurrently
//! 2. Stops if shutdown was requested
//! 3. Sweeps expired entries once the sweep interval has elapsed
//! 4. Sleeps for the flush interval, waking early on shutdown
//!
//! The loop runs under [`supervise`], which restarts it if it panics so a
//! single fault never halts maintenance for the lifetime of the engine.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use super::shared::EngineCore;
use super::stats::EngineMetrics;
use crate::merge::MergePolicy;
use crate::store::BackingStore;

/// True once shutdown was signalled or the engine handle was dropped.
fn shutdown_requested(shutdown_rx: &watch::Receiver<bool>) -> bool {
    *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err()
}

/// Run the maintenance loop, restarting it after a panic.
pub(crate) async fn supervise<S, P>(core: Arc<EngineCore<S, P>>, shutdown_rx: watch::Receiver<bool>)
where
    S: BackingStore + 'static,
    P: MergePolicy + 'static,
{
    loop {
        let handle = tokio::spawn(run_maintenance(Arc::clone(&core), shutdown_rx.clone()));

        match handle.await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                EngineMetrics::incr(&core.metrics.loop_restarts);
                tracing::error!(error = %e, "Cache maintenance loop panicked, restarting");
                if shutdown_requested(&shutdown_rx) {
                    break;
                }
                tokio::time::sleep(core.config.flush_interval).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache maintenance loop cancelled");
                break;
            }
        }
    }
}

/// The maintenance loop body. Returns once shutdown is observed, after a
/// final drain of the write-back queue.
pub(crate) async fn run_maintenance<S, P>(
    core: Arc<EngineCore<S, P>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: BackingStore + 'static,
    P: MergePolicy + 'static,
{
    let config = core.config.clone();
    let mut last_sweep = Instant::now();

    tracing::info!(
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        entry_ttl_secs = config.entry_ttl.as_secs(),
        "Cache maintenance loop started"
    );

    loop {
        match core.drain().await {
            Ok(0) => tracing::trace!("Maintenance cycle with nothing to flush"),
            Ok(flushed) => tracing::debug!(flushed, "Write-back queue flushed"),
            Err(e) => tracing::warn!(error = %e, "Write-back flush completed with failures"),
        }

        if shutdown_requested(&shutdown_rx) {
            break;
        }

        if last_sweep.elapsed() > config.sweep_interval {
            core.sweep().await;
            last_sweep = Instant::now();
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(config.flush_interval) => {}
        }
    }

    let stats = core.stats();
    tracing::info!(
        flushes = stats.flushes,
        flush_errors = stats.flush_errors,
        evictions = stats.evictions,
        pending_writes = stats.pending_writes,
        "Cache maintenance loop stopped"
    );
}
