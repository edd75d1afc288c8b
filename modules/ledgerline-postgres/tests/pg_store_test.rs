//! Integration tests for the Postgres backend.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ledgerline_events::{
    AppendOptions, Event, EventAppended, EventStore, HybridStore, SaveSnapshotOptions,
    SnapshotData, SnapshotStore, StoreError, WriteMode,
};
use ledgerline_postgres::{PgHybridStore, PgStoreConfig, PoolConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tally {
    total: i64,
}

/// Get a test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    PoolConfig::new(url).connect().await.ok()
}

/// A hybrid store on freshly named tables so tests can run in parallel.
async fn test_store(write_mode: WriteMode) -> Option<PgHybridStore<Event, Tally>> {
    let pool = test_pool().await?;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let config = PgStoreConfig::new("Tally")
        .with_event_table(format!("tally_events_{suffix}"))
        .with_snapshot_table(format!("tally_snapshots_{suffix}"))
        .with_write_mode(write_mode);

    let store = PgHybridStore::new(pool, &config);
    store.init_tables().await.ok()?;
    Some(store)
}

fn ev(name: &str, n: i64) -> Event {
    Event::new(name, json!({ "n": n }))
}

fn data(total: i64, version: i64) -> SnapshotData<Tally> {
    SnapshotData {
        state: Tally { total },
        version,
    }
}

// =========================================================================
// Event log
// =========================================================================

#[tokio::test]
async fn init_tables_is_idempotent() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store.init_tables().await.unwrap();
}

#[tokio::test]
async fn appends_are_gapless_and_ordered() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };

    store
        .append("t-1", &[ev("Added", 1), ev("Added", 2)], AppendOptions::after(0))
        .await
        .unwrap();
    store
        .append("t-1", &[ev("Removed", 1)], AppendOptions::unchecked())
        .await
        .unwrap();

    let records = store.get_records_from_sequence("t-1", None).await.unwrap();
    let sequences: Vec<i64> = records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(records[2].event, ev("Removed", 1));

    let page = store.get_events_from_sequence("t-1", Some(1)).await.unwrap();
    assert_eq!(page.events, vec![ev("Added", 2), ev("Removed", 1)]);
    assert_eq!(page.last_event_sequence, 3);
}

#[tokio::test]
async fn out_of_range_reads_report_the_true_last_sequence() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .append("t-1", &[ev("Added", 1), ev("Added", 2)], AppendOptions::unchecked())
        .await
        .unwrap();

    let page = store.get_events_from_sequence("t-1", Some(50)).await.unwrap();
    assert!(page.events.is_empty());
    assert_eq!(page.last_event_sequence, 2);

    let page = store.get_events_from_sequence("t-1", Some(-3)).await.unwrap();
    assert_eq!(page.events.len(), 2);

    let page = store.get_events_from_sequence("nobody", None).await.unwrap();
    assert!(page.events.is_empty());
    assert_eq!(page.last_event_sequence, 0);
}

#[tokio::test]
async fn stale_sequence_is_a_wrong_sequence_error() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .append("t-1", &[ev("Added", 1)], AppendOptions::after(0))
        .await
        .unwrap();

    let err = store
        .append("t-1", &[ev("Added", 2)], AppendOptions::after(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::WrongSequence { invalid_sequence: 0, .. }));

    let page = store.get_events_from_sequence("t-1", None).await.unwrap();
    assert_eq!(page.last_event_sequence, 1);
}

#[tokio::test]
async fn concurrent_appends_have_exactly_one_winner() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    let store = Arc::new(store);
    store
        .append("t-1", &[ev("Added", 1)], AppendOptions::after(0))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append("t-1", &[ev("Added", n)], AppendOptions::after(1))
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => wins += 1,
            Err(StoreError::Concurrency {
                sequence_in_conflict,
                ..
            }) => assert_eq!(sequence_in_conflict, 1),
            Err(StoreError::WrongSequence {
                invalid_sequence, ..
            }) => assert_eq!(invalid_sequence, 1),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(wins, 1);
    let page = store.get_events_from_sequence("t-1", None).await.unwrap();
    assert_eq!(page.last_event_sequence, 2);
}

#[tokio::test]
async fn pages_stay_consistent_under_concurrent_appends() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    let store = Arc::new(store);
    store
        .append("t-1", &[ev("Added", 0)], AppendOptions::after(0))
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for n in 1..=40 {
                store
                    .append("t-1", &[ev("Added", n)], AppendOptions::unchecked())
                    .await
                    .unwrap();
            }
        })
    };

    let mut from = 1;
    while !writer.is_finished() {
        let page = store.get_events_from_sequence("t-1", Some(from)).await.unwrap();
        // The last sequence always matches the events the page returned.
        assert_eq!(page.last_event_sequence, from + page.events.len() as i64);
        from = page.last_event_sequence;
    }
    writer.await.unwrap();

    let page = store.get_events_from_sequence("t-1", Some(from)).await.unwrap();
    assert_eq!(page.last_event_sequence, 41);
}

#[tokio::test]
async fn listeners_fire_after_commit_only() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    store.on_event_appended(Arc::new(move |n: &EventAppended<Event>| -> anyhow::Result<()> {
        assert_eq!(n.entity_name, "Tally");
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    store
        .append_with_snapshot("t-1", &[ev("Added", 1)], data(1, 1), AppendOptions::after(0))
        .await
        .unwrap();
    let _ = store
        .append_with_snapshot("t-1", &[ev("Added", 1)], data(2, 2), AppendOptions::after(0))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =========================================================================
// Snapshots
// =========================================================================

#[tokio::test]
async fn append_mode_keeps_history_and_rejects_duplicates() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .save_snapshot("t-1", data(1, 1), SaveSnapshotOptions::default())
        .await
        .unwrap();
    store
        .save_snapshot("t-1", data(3, 2), SaveSnapshotOptions::default())
        .await
        .unwrap();

    let last = store.get_last_snapshot("t-1").await.unwrap().unwrap();
    assert_eq!((last.version, last.state.total), (2, 3));
    let first = store.get_snapshot("t-1", 1).await.unwrap().unwrap();
    assert_eq!(first.state.total, 1);

    let err = store
        .save_snapshot("t-1", data(9, 2), SaveSnapshotOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
}

#[tokio::test]
async fn concurrent_snapshot_saves_of_distinct_versions_all_succeed() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    let store = Arc::new(store);
    store
        .save_snapshot("t-1", data(1, 1), SaveSnapshotOptions::default())
        .await
        .unwrap();

    let mut next = 2;
    for _ in 0..20 {
        let mut handles = Vec::new();
        for version in next..next + 4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save_snapshot("t-1", data(version, version), SaveSnapshotOptions::default())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        next += 4;
    }

    let last = store.get_last_snapshot("t-1").await.unwrap().unwrap();
    assert_eq!(last.version, next - 1);
    assert_eq!(
        store.list_entities().await.unwrap(),
        vec![Tally { total: next - 1 }]
    );
}

#[tokio::test]
async fn replace_mode_keeps_a_single_row() {
    let Some(store) = test_store(WriteMode::Replace).await else {
        return;
    };
    for version in 1..=3 {
        store
            .save_snapshot("t-1", data(version * 10, version), SaveSnapshotOptions::default())
            .await
            .unwrap();
    }

    assert!(store.get_snapshot("t-1", 1).await.unwrap().is_none());
    assert!(store.get_snapshot("t-1", 2).await.unwrap().is_none());
    let last = store.get_last_snapshot("t-1").await.unwrap().unwrap();
    assert_eq!((last.version, last.state.total), (3, 30));
    assert_eq!(store.list_entities().await.unwrap(), vec![Tally { total: 30 }]);
}

#[tokio::test]
async fn compact_and_overwrite_last_modes() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    for version in 1..=3 {
        store
            .save_snapshot("t-1", data(version, version), SaveSnapshotOptions::default())
            .await
            .unwrap();
    }

    store
        .save_snapshot(
            "t-1",
            data(40, 4),
            SaveSnapshotOptions::with_mode(WriteMode::OverwriteLast),
        )
        .await
        .unwrap();
    assert!(store.get_snapshot("t-1", 3).await.unwrap().is_none());
    assert!(store.get_snapshot("t-1", 2).await.unwrap().is_some());

    store
        .save_snapshot(
            "t-1",
            data(50, 5),
            SaveSnapshotOptions::with_mode(WriteMode::Compact),
        )
        .await
        .unwrap();
    assert!(store.get_snapshot("t-1", 2).await.unwrap().is_none());
    let last = store.get_last_snapshot("t-1").await.unwrap().unwrap();
    assert_eq!(last.version, 5);
}

// =========================================================================
// Hybrid store
// =========================================================================

#[tokio::test]
async fn rejected_append_rolls_back_the_snapshot() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .append_with_snapshot("t-1", &[ev("Added", 1)], data(1, 1), AppendOptions::after(0))
        .await
        .unwrap();

    let err = store
        .append_with_snapshot("t-1", &[ev("Added", 2)], data(3, 2), AppendOptions::after(0))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    assert!(store.get_snapshot("t-1", 2).await.unwrap().is_none());
    let page = store.get_events_from_sequence("t-1", None).await.unwrap();
    assert_eq!(page.last_event_sequence, 1);
}

#[tokio::test]
async fn failed_snapshot_rolls_back_the_events() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .append_with_snapshot("t-1", &[ev("Added", 1)], data(1, 1), AppendOptions::after(0))
        .await
        .unwrap();

    // Snapshot version 1 already exists: the insert fails inside the transaction.
    let err = store
        .append_with_snapshot("t-1", &[ev("Added", 2)], data(3, 1), AppendOptions::after(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));

    let page = store.get_events_from_sequence("t-1", None).await.unwrap();
    assert_eq!(page.last_event_sequence, 1);
}

#[tokio::test]
async fn list_entities_reads_the_latest_flag() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store
        .append_with_snapshot("a", &[ev("Added", 1)], data(1, 1), AppendOptions::after(0))
        .await
        .unwrap();
    store
        .append_with_snapshot("a", &[ev("Added", 2)], data(3, 2), AppendOptions::after(1))
        .await
        .unwrap();
    store
        .append_with_snapshot("b", &[ev("Added", 5)], data(5, 1), AppendOptions::after(0))
        .await
        .unwrap();

    let states = store.list_entities().await.unwrap();
    assert_eq!(states, vec![Tally { total: 3 }, Tally { total: 5 }]);
}

#[tokio::test]
async fn closed_pool_surfaces_a_backend_error() {
    let Some(store) = test_store(WriteMode::Append).await else {
        return;
    };
    store.close().await;

    let err = store
        .append("t-1", &[ev("Added", 1)], AppendOptions::unchecked())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
}
