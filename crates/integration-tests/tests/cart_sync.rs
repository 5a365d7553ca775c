//! Cart synchronizer scenarios against an in-memory cart store.
//!
//! All tests run on paused tokio time, so timestamps are exact.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use pokebolsa_core::{Cart, ProductId, QuantityChange, RecordId, SessionId};
use pokebolsa_integration_tests::{CartCall, FakeCartStore, product};
use pokebolsa_storefront::cart_store::RemoteCartRecord;
use pokebolsa_storefront::{
    CartSynchronizer, MemoryStore, SessionIdentity, SyncNotice, SyncOptions, SyncState,
};
use tokio::time::Instant;

fn options() -> SyncOptions {
    SyncOptions {
        debounce: Duration::from_millis(1000),
    }
}

async fn loaded(
    store: &Arc<FakeCartStore>,
    storage: &Arc<MemoryStore>,
) -> CartSynchronizer<FakeCartStore> {
    let mut sync = CartSynchronizer::new(Arc::clone(store), options());
    sync.load(&SessionIdentity::new(Arc::clone(storage))).await;
    sync
}

// =============================================================================
// Debounce
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_mutations_is_one_save_of_the_last_state() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;
    let started = Instant::now();

    sync.add_item(&product("me1-1", 1200));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sync.add_item(&product("me1-2", 800));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sync.change_quantity(&ProductId::new("me1-1"), QuantityChange::Increase);
    let expected = sync.cart().clone();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let writes = store.writes().await;
    assert_eq!(writes.len(), 1, "expected one save, got {writes:?}");
    let CartCall::Create { at, cart, .. } = &writes[0] else {
        panic!("expected a create, got {writes:?}");
    };
    assert_eq!(at.duration_since(started), Duration::from_millis(1400));
    assert_eq!(cart, &expected);
    assert_eq!(sync.status().state, SyncState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_save_waits_for_a_full_quiet_period() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;

    sync.add_item(&product("a", 100));
    tokio::time::sleep(Duration::from_millis(999)).await;
    assert!(store.writes().await.is_empty());
    assert_eq!(sync.status().state, SyncState::SavePending);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(store.writes().await.len(), 1);
}

// =============================================================================
// Create, then update
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_save_creates_and_later_saves_update_that_record() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;
    let mut notices = sync.take_notices().unwrap();

    sync.add_item(&product("a", 500));
    sync.settled().await;
    sync.add_item(&product("b", 700));
    sync.settled().await;
    sync.remove_item(&ProductId::new("a"));
    sync.settled().await;

    let writes = store.writes().await;
    assert_eq!(writes.len(), 3);
    assert!(matches!(&writes[0], CartCall::Create { .. }));
    for write in &writes[1..] {
        let CartCall::Update { record_id, .. } = write else {
            panic!("expected an update, got {write:?}");
        };
        assert_eq!(record_id.as_str(), "rec1");
    }

    assert_eq!(store.records().await.len(), 1);
    assert_eq!(store.records().await[0].cart, *sync.cart());
    assert_eq!(sync.status().record_id, Some(RecordId::new("rec1")));

    assert_eq!(
        notices.recv().await,
        Some(SyncNotice::Created(RecordId::new("rec1")))
    );
    assert_eq!(
        notices.recv().await,
        Some(SyncNotice::Updated(RecordId::new("rec1")))
    );
}

#[tokio::test(start_paused = true)]
async fn test_saves_never_overlap() {
    let store = Arc::new(FakeCartStore::with_write_latency(Duration::from_secs(3)));
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;
    let started = Instant::now();

    // First save runs from t=1000 to t=4000.
    sync.add_item(&product("a", 500));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    sync.add_item(&product("b", 500));
    assert_eq!(store.writes().await.len(), 1);

    sync.settled().await;

    let writes = store.writes().await;
    assert_eq!(writes.len(), 2, "expected create then update, got {writes:?}");
    let CartCall::Update { at, record_id, cart } = &writes[1] else {
        panic!("second save should update the created record, got {writes:?}");
    };
    assert_eq!(record_id.as_str(), "rec1");
    assert_eq!(cart.len(), 2);
    // The next debounce window starts only once the first save finished.
    assert_eq!(at.duration_since(started), Duration::from_millis(5000));
    assert_eq!(store.records().await.len(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_save_keeps_local_cart_and_next_mutation_retries() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;
    let mut notices = sync.take_notices().unwrap();

    store.fail_writes(true);
    sync.add_item(&product("a", 500));
    sync.add_item(&product("a", 500));
    sync.settled().await;

    assert!(matches!(
        notices.recv().await,
        Some(SyncNotice::SaveFailed { .. })
    ));
    assert_eq!(sync.cart().unit_count(), 2);
    assert_eq!(sync.status().state, SyncState::Ready);
    assert!(store.records().await.is_empty());

    // No automatic retry.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.writes().await.len(), 1);

    store.fail_writes(false);
    sync.change_quantity(&ProductId::new("a"), QuantityChange::Decrease);
    sync.settled().await;

    let records = store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cart.unit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hydration_failure_is_an_empty_ready_cart() {
    let store = Arc::new(FakeCartStore::new());
    store.fail_reads(true);
    let storage = Arc::new(MemoryStore::new());

    let mut sync = loaded(&store, &storage).await;
    assert!(sync.cart().is_empty());
    assert_eq!(sync.status().state, SyncState::Ready);
    assert_eq!(sync.status().record_id, None);

    sync.add_item(&product("a", 500));
    sync.settled().await;
    assert!(matches!(&store.writes().await[0], CartCall::Create { .. }));
}

// =============================================================================
// Hydration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_saved_cart_hydrates_equal_in_a_new_session_instance() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());

    let mut first = loaded(&store, &storage).await;
    first.add_item(&product("c", 300));
    first.add_item(&product("a", 1250));
    first.add_item(&product("c", 300));
    first.settled().await;
    let saved = first.cart().clone();
    first.shutdown().await;

    let mut second = loaded(&store, &storage).await;
    assert_eq!(second.cart(), &saved);
    assert_eq!(second.session_id(), first.session_id());
    assert_eq!(second.status().record_id, Some(RecordId::new("rec1")));

    // Hydrating does not write anything back.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.writes().await.len(), 1);

    second.remove_item(&ProductId::new("c"));
    second.settled().await;
    assert!(matches!(&store.writes().await[1], CartCall::Update { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_hydration_normalizes_stored_lines() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let session_id = SessionIdentity::new(Arc::clone(&storage))
        .get_or_create()
        .await
        .unwrap();

    let stored: Cart = serde_json::from_str(
        r#"[{"id":"a","name":"A","price":1.5,"description":"","quantity":1},
            {"id":"b","name":"B","price":2.0,"description":"","quantity":0},
            {"id":"a","name":"A","price":1.5,"description":"","quantity":2}]"#,
    )
    .unwrap();
    store
        .seed(RemoteCartRecord {
            record_id: RecordId::new("legacy"),
            session_id: SessionId::new(session_id.as_str()),
            cart: stored,
        })
        .await;

    let sync = loaded(&store, &storage).await;
    assert_eq!(sync.cart().len(), 1);
    assert_eq!(sync.cart().get(&ProductId::new("a")).unwrap().quantity, 3);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_the_pending_save() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    let mut sync = loaded(&store, &storage).await;

    sync.add_item(&product("a", 500));
    tokio::time::sleep(Duration::from_millis(300)).await;
    sync.shutdown().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(store.writes().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_synchronizer_cancels_the_pending_save() {
    let store = Arc::new(FakeCartStore::new());
    let storage = Arc::new(MemoryStore::new());
    {
        let mut sync = loaded(&store, &storage).await;
        sync.add_item(&product("a", 500));
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(store.writes().await.is_empty());
}
