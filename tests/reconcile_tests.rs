//! Reconciliation with the server: manual sync, the background scheduler,
//! and the startup load path.


use std::time::Duration;

use test_harness::{assert_eventually, job, wait_for, FakeGateway, Op, TestTracker};
use tokio_util::sync::CancellationToken;
use tracker_lite::board::{Column, JobDraft, JobId, JobPatch, TrackedJob};
use tracker_lite::cache::{CacheSnapshot, MemoryCache};
use tracker_lite::reconcile::ReconciliationScheduler;
use tracker_lite::tracker::{LoadSource, ReconcileOutcome};
use tracker_lite::TrackerError;

#[tokio::test]
async fn test_sync_overwrites_local_state() {
    let h = TestTracker::loaded(vec![
        job("a", Column::Applied, 0),
        job("b", Column::Applied, 1),
    ])
    .await;

    h.tracker
        .update_job(
            &JobId::server("a"),
            JobPatch {
                notes: Some("local only".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The server moves on independently.
    h.gateway.seed(vec![
        job("b", Column::Offer, 0),
        job("z", Column::Applied, 0),
    ]);

    let outcome = h.tracker.sync_with_server().await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Synced { jobs: 2 });

    let local: Vec<_> = h
        .tracker
        .columns()
        .await
        .into_iter()
        .map(|c| (c.id, c.jobs))
        .collect();
    let server: Vec<_> = h
        .gateway
        .server_columns()
        .into_iter()
        .map(|c| (c.id, c.jobs))
        .collect();
    assert_eq!(local, server);

    let status = h.tracker.status().await;
    assert!(!status.pending_changes);
    assert!(!status.is_syncing);
    assert!(status.last_synced.is_some());
    assert_eq!(h.cached_jobs(), h.tracker.jobs().await);
}

#[tokio::test]
async fn test_sync_rejects_malformed_server_board() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    let before = h.tracker.jobs().await;

    h.gateway.serve_raw(vec![
        job("a", Column::Applied, 0),
        job("b", Column::Applied, 0),
    ]);

    let err = h.tracker.sync_with_server().await.unwrap_err();
    assert!(matches!(err, TrackerError::InvariantViolation(_)));
    assert_eq!(h.tracker.jobs().await, before);
    assert!(h
        .tracker
        .status()
        .await
        .error
        .unwrap()
        .contains("duplicate position 0"));
}

#[tokio::test]
async fn test_sync_failure_keeps_local_state() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    h.tracker
        .move_job(&JobId::server("a"), Column::Applied, Column::Interview, None)
        .await
        .unwrap();
    let before = h.tracker.jobs().await;

    h.gateway.fail(Op::FetchAll);
    let err = h.tracker.sync_with_server().await.unwrap_err();
    assert!(err.is_transient());

    assert_eq!(h.tracker.jobs().await, before);
    let status = h.tracker.status().await;
    assert!(status.pending_changes);
    assert!(status.error.is_none());
    assert!(status.warning.unwrap().starts_with("Sync failed"));
}

#[tokio::test]
async fn test_sync_waits_for_in_flight_mutation() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    h.gateway.hold();

    let tracker = h.tracker.clone();
    let add = tokio::spawn(async move { tracker.add_job(JobDraft::new("SRE", "Initech")).await });
    let gateway = h.gateway.clone();
    assert_eventually(
        || {
            let gateway = gateway.clone();
            async move { gateway.call_count(Op::Create) == 1 }
        },
        Duration::from_secs(2),
        "create should be in flight",
    )
    .await;

    let tracker = h.tracker.clone();
    let sync = tokio::spawn(async move { tracker.sync_with_server().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sync.is_finished());
    assert_eq!(h.gateway.call_count(Op::FetchAll), 1);

    h.gateway.release();
    let created = add.await.unwrap().unwrap();
    assert_eq!(
        sync.await.unwrap().unwrap(),
        ReconcileOutcome::Synced { jobs: 2 }
    );
    assert_eq!(h.tracker.job(&created.id).await.unwrap().column, Column::Wishlist);
    assert!(h.tracker.jobs().await.iter().all(|j| !j.id.is_temp()));
}

#[tokio::test]
async fn test_reconcile_if_pending_skips_clean_board() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    let fetches = h.gateway.call_count(Op::FetchAll);

    let outcome = h.tracker.reconcile_if_pending().await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Skipped);
    assert_eq!(h.gateway.call_count(Op::FetchAll), fetches);
}

#[tokio::test]
async fn test_scheduler_reconciles_pending_changes() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    h.tracker
        .delete_job(&JobId::server("a"))
        .await
        .unwrap();
    assert!(h.tracker.status().await.pending_changes);

    h.gateway.seed(vec![job("server-side", Column::Offer, 0)]);

    let shutdown = CancellationToken::new();
    let handle = ReconciliationScheduler::new(h.tracker.clone(), Duration::from_millis(30))
        .spawn(shutdown.clone());

    let tracker = h.tracker.clone();
    assert_eventually(
        || {
            let tracker = tracker.clone();
            async move { !tracker.status().await.pending_changes }
        },
        Duration::from_secs(3),
        "scheduler should reconcile pending changes",
    )
    .await;

    assert_eq!(
        h.tracker.column(Column::Offer).await[0].id,
        JobId::server("server-side")
    );

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler should stop on cancel")
        .unwrap();
}

#[tokio::test]
async fn test_scheduler_idle_without_pending_changes() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    let fetches = h.gateway.call_count(Op::FetchAll);

    let shutdown = CancellationToken::new();
    let handle = ReconciliationScheduler::new(h.tracker.clone(), Duration::from_millis(20))
        .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.gateway.call_count(Op::FetchAll), fetches);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_scheduler_retries_after_fetch_failure() {
    let h = TestTracker::loaded(vec![job("a", Column::Applied, 0)]).await;
    h.tracker
        .move_job(&JobId::server("a"), Column::Applied, Column::Offer, None)
        .await
        .unwrap();
    h.gateway.fail(Op::FetchAll);

    let shutdown = CancellationToken::new();
    let handle = ReconciliationScheduler::new(h.tracker.clone(), Duration::from_millis(20))
        .spawn(shutdown.clone());

    let gateway = h.gateway.clone();
    assert!(
        wait_for(
            || {
                let gateway = gateway.clone();
                async move { gateway.call_count(Op::FetchAll) >= 3 }
            },
            Duration::from_secs(3),
            Duration::from_millis(10),
        )
        .await,
        "scheduler should keep retrying"
    );
    let status = h.tracker.status().await;
    assert!(status.pending_changes);
    assert!(status.warning.is_none());
    assert_eq!(h.tracker.column(Column::Offer).await.len(), 1);

    h.gateway.recover(Op::FetchAll);
    let tracker = h.tracker.clone();
    assert_eventually(
        || {
            let tracker = tracker.clone();
            async move { !tracker.status().await.pending_changes }
        },
        Duration::from_secs(3),
        "scheduler should succeed once the server is back",
    )
    .await;
    assert!(h.tracker.status().await.warning.is_none());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_load_falls_back_to_cache() {
    let cached = vec![job("a", Column::Applied, 0), job("b", Column::Offer, 0)];
    let snapshot = CacheSnapshot::new(cached.clone());
    let saved_at = snapshot.saved_at;

    let gateway = FakeGateway::new();
    gateway.fail(Op::FetchAll);
    let h = TestTracker::with_cache(gateway, MemoryCache::with_snapshot(snapshot));

    let source = h.tracker.load().await.unwrap();
    assert_eq!(source, LoadSource::Cache { jobs: 2, saved_at });
    assert_eq!(h.tracker.jobs().await, cached);

    let status = h.tracker.status().await;
    assert!(!status.is_loading);
    assert!(status.warning.unwrap().contains("cached data"));
    assert!(status.last_synced.is_none());
    assert!(status.pending_changes);
}

#[tokio::test]
async fn test_scheduler_refreshes_board_loaded_from_cache() {
    let gateway = FakeGateway::with_jobs(vec![job("fresh", Column::Applied, 0)]);
    gateway.fail(Op::FetchAll);
    let h = TestTracker::with_cache(
        gateway,
        MemoryCache::with_snapshot(CacheSnapshot::new(vec![job("old", Column::Wishlist, 0)])),
    );
    assert!(matches!(
        h.tracker.load().await.unwrap(),
        LoadSource::Cache { jobs: 1, .. }
    ));

    h.gateway.recover(Op::FetchAll);
    let shutdown = CancellationToken::new();
    let handle = ReconciliationScheduler::new(h.tracker.clone(), Duration::from_millis(20))
        .spawn(shutdown.clone());

    let tracker = h.tracker.clone();
    assert_eventually(
        || {
            let tracker = tracker.clone();
            async move { !tracker.status().await.pending_changes }
        },
        Duration::from_secs(3),
        "scheduler should replace the cached board once the server is back",
    )
    .await;

    assert_eq!(h.column_ids(Column::Applied).await, vec!["fresh"]);
    assert!(h.column_ids(Column::Wishlist).await.is_empty());
    let status = h.tracker.status().await;
    assert!(status.warning.is_none());
    assert!(status.last_synced.is_some());
    assert_eq!(h.cached_jobs(), h.tracker.jobs().await);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_load_from_cache_discards_unconfirmed_jobs() {
    let mut unconfirmed = TrackedJob::new(JobDraft::new("Dev", "Globex").in_column(Column::Applied));
    unconfirmed.position = 1;
    let snapshot = CacheSnapshot::new(vec![
        job("a", Column::Applied, 0),
        unconfirmed,
        job("b", Column::Applied, 2),
    ]);

    let gateway = FakeGateway::new();
    gateway.fail(Op::FetchAll);
    let h = TestTracker::with_cache(gateway, MemoryCache::with_snapshot(snapshot));

    assert!(matches!(
        h.tracker.load().await.unwrap(),
        LoadSource::Cache { jobs: 2, .. }
    ));
    assert_eq!(h.column_ids(Column::Applied).await, vec!["a", "b"]);
    assert_eq!(h.column_positions(Column::Applied).await, vec![0, 1]);
    assert!(h.cached_jobs().iter().all(|j| !j.id.is_temp()));

    h.tracker
        .reorder_in_column(Column::Applied, &JobId::server("b"), 0)
        .await
        .unwrap();
    assert_eq!(h.column_ids(Column::Applied).await, vec!["b", "a"]);
    let batch: Vec<String> = h.gateway.reorders()[0].iter().map(|e| e.id.clone()).collect();
    assert_eq!(batch, vec!["b", "a"]);
}

#[tokio::test]
async fn test_load_without_cache_surfaces_error() {
    let gateway = FakeGateway::new();
    gateway.fail(Op::FetchAll);
    let h = TestTracker::new(gateway);

    let err = h.tracker.load().await.unwrap_err();
    assert!(err.is_transient());
    assert!(h.tracker.jobs().await.is_empty());
    assert!(h.tracker.status().await.error.is_some());
}

#[tokio::test]
async fn test_load_overwrites_stale_cache() {
    let stale = CacheSnapshot::new(vec![job("old", Column::Wishlist, 0)]);
    let h = TestTracker::with_cache(
        FakeGateway::with_jobs(vec![job("fresh", Column::Applied, 0)]),
        MemoryCache::with_snapshot(stale),
    );

    let source = h.tracker.load().await.unwrap();
    assert_eq!(source, LoadSource::Remote { jobs: 1 });
    let cached = h.cached_jobs();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, JobId::server("fresh"));
}

#[tokio::test]
async fn test_load_rejects_malformed_server_board() {
    let gateway = FakeGateway::new();
    gateway.serve_raw(vec![job("a", Column::Applied, 1)]);
    let h = TestTracker::new(gateway);

    let err = h.tracker.load().await.unwrap_err();
    assert!(matches!(err, TrackerError::InvariantViolation(_)));
    assert!(h.tracker.jobs().await.is_empty());
}
