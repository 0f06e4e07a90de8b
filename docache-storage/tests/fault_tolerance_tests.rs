//! Store failures during write-back must never lose a staged write or stop
//! the maintenance loop.

use std::sync::Arc;
use std::time::Duration;

use docache_test_utils::assertions::{assert_field, assert_store_error};
use docache_test_utils::fixtures::{fast_config, test_document};
use docache_test_utils::{init_test_tracing, BackingStore, CacheEngine, FlakyStore};

fn manual_flush_engine(store: &Arc<FlakyStore>) -> CacheEngine<Arc<FlakyStore>> {
    CacheEngine::new(
        Arc::clone(store),
        fast_config().with_flush_interval(Duration::from_secs(3600)),
    )
    .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn failed_flush_is_requeued_and_retried() {
    init_test_tracing();
    let store = Arc::new(FlakyStore::new());
    let engine = manual_flush_engine(&store);

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.fail_upserts_for(&id);
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    assert_store_error(&engine.flush().await);
    assert!(engine.is_pending(&id));
    assert!(engine.stats().flush_errors >= 1);
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v1");

    // The cached value stays authoritative while the store is failing.
    let cached = engine.read_item_by_id(&id).await.unwrap().unwrap();
    assert_field(&cached, "testData", "v2");

    store.heal(&id);
    assert_eq!(engine.flush().await.unwrap(), 1);
    assert!(!engine.is_pending(&id));
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v2");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn one_failing_item_does_not_block_others() {
    let store = Arc::new(FlakyStore::new());
    let engine = manual_flush_engine(&store);

    let broken = engine.create_item(&test_document("a1")).await.unwrap();
    let healthy = engine.create_item(&test_document("b1")).await.unwrap();
    store.fail_upserts_for(&broken);

    engine
        .upsert_item(&test_document("a2").with_id(broken.clone()))
        .await
        .unwrap();
    engine
        .upsert_item(&test_document("b2").with_id(healthy.clone()))
        .await
        .unwrap();

    assert!(engine.flush().await.is_err());

    assert_field(&store.inner().peek(&healthy).unwrap(), "testData", "b2");
    assert!(!engine.is_pending(&healthy));
    assert!(engine.is_pending(&broken));

    store.heal(&broken);
    engine.shutdown().await.unwrap();
    assert_field(&store.inner().peek(&broken).unwrap(), "testData", "a2");
}

#[tokio::test(start_paused = true)]
async fn panicking_store_is_contained() {
    let store = Arc::new(FlakyStore::new());
    let engine = manual_flush_engine(&store);

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.panic_once_on_upsert(&id);
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    assert_store_error(&engine.flush().await);
    assert!(engine.is_pending(&id));

    assert_eq!(engine.flush().await.unwrap(), 1);
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v2");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn maintenance_loop_keeps_retrying() {
    let store = Arc::new(FlakyStore::new());
    let engine = CacheEngine::new(Arc::clone(&store), fast_config()).unwrap();

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.fail_upserts_for(&id);
    store.panic_once_on_upsert(&id);
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stats = engine.stats();
    assert!(stats.flush_errors >= 2, "{stats:?}");
    assert_eq!(stats.loop_restarts, 0);
    assert!(engine.is_pending(&id));

    store.heal(&id);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!engine.is_pending(&id));
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v2");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_search_drain_keeps_writes_queued() {
    let store = Arc::new(FlakyStore::new());
    let engine = manual_flush_engine(&store);

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.fail_upserts_for(&id);
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    assert_store_error(&engine.search("", None).await);
    assert!(engine.is_pending(&id));

    store.heal(&id);
    let found = engine.search("testData eq 'v2'", None).await.unwrap();
    assert_eq!(found.len(), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_reported() {
    let store = Arc::new(FlakyStore::new());
    let engine = manual_flush_engine(&store);

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.set_fail_deletes(true);

    assert_store_error(&engine.delete_item(&id).await);
    assert!(!engine.is_cached(&id));

    store.set_fail_deletes(false);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn panic_while_flushing_expired_entry_keeps_write_queued() {
    let store = Arc::new(FlakyStore::new());
    let engine = CacheEngine::new(
        Arc::clone(&store),
        fast_config()
            .with_ttl(Duration::from_secs(2))
            .with_flush_interval(Duration::from_secs(3600))
            .with_sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    // Let the loop run its first, empty cycle and park.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(3)).await;
    store.panic_once_on_upsert(&id);

    // The read has to flush the expired entry first; the panic surfaces as
    // a store error and the write stays queued.
    assert_store_error(&engine.read_item_by_id(&id).await);
    assert!(engine.is_pending(&id));
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v1");

    assert_eq!(engine.flush().await.unwrap(), 1);
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v2");

    let doc = engine.read_item_by_id(&id).await.unwrap().unwrap();
    assert_field(&doc, "testData", "v2");

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sweep_retries_expired_entry_until_store_recovers() {
    let store = Arc::new(FlakyStore::new());
    let engine = CacheEngine::new(
        Arc::clone(&store),
        fast_config()
            .with_ttl(Duration::from_secs(1))
            .with_sweep_interval(Duration::from_millis(200)),
    )
    .unwrap();

    let id = engine.create_item(&test_document("v1")).await.unwrap();
    store.fail_upserts_for(&id);
    store.panic_once_on_upsert(&id);
    engine
        .upsert_item(&test_document("v2").with_id(id.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(engine.is_pending(&id));
    assert_eq!(engine.stats().evictions, 0);

    store.heal(&id);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!engine.is_pending(&id));
    assert_eq!(engine.stats().entry_count, 0);
    assert_field(&store.inner().peek(&id).unwrap(), "testData", "v2");

    engine.shutdown().await.unwrap();
}
