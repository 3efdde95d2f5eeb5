use chrono::{Duration, Utc};
use uuid::Uuid;

use argus_core::models::{FetchStatus, NewChange, NewSnapshot, Source};
use argus_db::{ChangeRepository, SnapshotRepository, SourceRepository};

use crate::integration::common::setup_test_db;

fn test_source(url: &str) -> Source {
    Source {
        id: Uuid::new_v4(),
        name: "Visa Developer Docs".into(),
        url: url.into(),
        region: "Global".into(),
        active: true,
    }
}

fn success_snapshot(source_id: Uuid, hash: &str, offset_secs: i64) -> NewSnapshot {
    NewSnapshot {
        source_id,
        content: format!("content for {hash}"),
        content_hash: hash.repeat(16),
        captured_at: Utc::now() + Duration::seconds(offset_secs),
        status: FetchStatus::Success,
        error_detail: None,
    }
}

#[tokio::test]
async fn upsert_source_is_keyed_by_url() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    let first = repo
        .upsert(&test_source("https://example.com/docs"))
        .await
        .unwrap();

    let mut renamed = test_source("https://example.com/docs");
    renamed.name = "Renamed Docs".into();
    renamed.region = "Europe".into();
    let second = repo.upsert(&renamed).await.unwrap();

    // Same row, refreshed attributes.
    assert_eq!(first.id, second.id);
    assert_eq!(second.name, "Renamed Docs");
    assert_eq!(second.region, "Europe");

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn deactivated_sources_drop_out_of_list_active() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    repo.upsert(&test_source("https://a.example.com"))
        .await
        .unwrap();
    let mut inactive = test_source("https://b.example.com");
    inactive.active = false;
    repo.upsert(&inactive).await.unwrap();

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].url, "https://a.example.com");
}

#[tokio::test]
async fn latest_and_previous_skip_error_snapshots() {
    let (pool, _container) = setup_test_db().await;
    let sources = SourceRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool);

    let source = sources
        .upsert(&test_source("https://example.com/docs"))
        .await
        .unwrap();

    let first = snapshots
        .insert(&success_snapshot(source.id, "a", 0))
        .await
        .unwrap();
    let second = snapshots
        .insert(&success_snapshot(source.id, "b", 10))
        .await
        .unwrap();
    // Newest capture is an error: invisible to comparison reads.
    snapshots
        .insert(&NewSnapshot {
            source_id: source.id,
            content: String::new(),
            content_hash: String::new(),
            captured_at: Utc::now() + Duration::seconds(20),
            status: FetchStatus::Error,
            error_detail: Some("HTTP 503".into()),
        })
        .await
        .unwrap();

    let latest = snapshots.latest(source.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.status, FetchStatus::Success);

    let previous = snapshots.previous(source.id).await.unwrap().unwrap();
    assert_eq!(previous.id, first.id);
}

#[tokio::test]
async fn latest_returns_none_for_unknown_source() {
    let (pool, _container) = setup_test_db().await;
    let snapshots = SnapshotRepository::new(pool);

    assert!(snapshots.latest(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn backlog_returns_unanalyzed_oldest_first() {
    let (pool, _container) = setup_test_db().await;
    let sources = SourceRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool.clone());
    let changes = ChangeRepository::new(pool);

    let source = sources
        .upsert(&test_source("https://example.com/docs"))
        .await
        .unwrap();
    let snap = snapshots
        .insert(&success_snapshot(source.id, "a", 0))
        .await
        .unwrap();

    // A baseline (already analyzed) and two pending changes.
    changes
        .insert(&NewChange {
            source_id: source.id,
            prior_snapshot_id: None,
            new_snapshot_id: snap.id,
            diff: String::new(),
            detected_at: Utc::now(),
            analyzed: true,
        })
        .await
        .unwrap();
    let older = changes
        .insert(&NewChange {
            source_id: source.id,
            prior_snapshot_id: Some(snap.id),
            new_snapshot_id: snap.id,
            diff: "-old\n+new".into(),
            detected_at: Utc::now() + Duration::seconds(5),
            analyzed: false,
        })
        .await
        .unwrap();
    let newer = changes
        .insert(&NewChange {
            source_id: source.id,
            prior_snapshot_id: Some(snap.id),
            new_snapshot_id: snap.id,
            diff: "-new\n+newer".into(),
            detected_at: Utc::now() + Duration::seconds(10),
            analyzed: false,
        })
        .await
        .unwrap();

    let backlog = changes.backlog(10).await.unwrap();
    assert_eq!(backlog.len(), 2);
    assert_eq!(backlog[0].id, older.id);
    assert_eq!(backlog[1].id, newer.id);

    changes.mark_analyzed(older.id).await.unwrap();
    let backlog = changes.backlog(10).await.unwrap();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].id, newer.id);
}

#[tokio::test]
async fn latest_for_source_sees_baselines() {
    let (pool, _container) = setup_test_db().await;
    let sources = SourceRepository::new(pool.clone());
    let snapshots = SnapshotRepository::new(pool.clone());
    let changes = ChangeRepository::new(pool);

    let source = sources
        .upsert(&test_source("https://example.com/docs"))
        .await
        .unwrap();
    let snap = snapshots
        .insert(&success_snapshot(source.id, "a", 0))
        .await
        .unwrap();

    let baseline = changes
        .insert(&NewChange {
            source_id: source.id,
            prior_snapshot_id: None,
            new_snapshot_id: snap.id,
            diff: String::new(),
            detected_at: Utc::now(),
            analyzed: true,
        })
        .await
        .unwrap();

    let latest = changes
        .latest_for_source(source.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, baseline.id);
    assert!(latest.is_baseline());
}
