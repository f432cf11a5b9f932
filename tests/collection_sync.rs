//! Integration tests for the collection synchronizer: optimistic mutations,
//! rollback, tombstones and stale-response guards.
//!
//! Each test drives a `CollectionSync` against its own scripted `FakeStore`.
//! Interleavings are forced with gates that hold a response in flight.

mod common;

use std::sync::Arc;

use common::{collection, source_ids, FakeStore};
use newsdeck::api::ApiError;
use newsdeck::model::CollectionDetails;
use newsdeck::sync::{CacheEvent, CollectionCache, CollectionSync, LoadGuard, SyncError};
use pretty_assertions::assert_eq;

fn fixture() -> FakeStore {
    let mut private = collection("c4", "u2", &["s5"]);
    private.is_public = false;
    FakeStore::new("u1").with_collections(vec![
        collection("c1", "u1", &["s1"]),
        collection("c2", "u1", &["s2", "s3"]),
        collection("c3", "u2", &["s4"]),
        private,
    ])
}

async fn setup(store: FakeStore) -> (Arc<FakeStore>, CollectionSync<FakeStore>) {
    let store = Arc::new(store);
    let sync = CollectionSync::new(Arc::clone(&store), Arc::new(CollectionCache::new()), "u1");
    assert!(sync.reload().await.unwrap());
    (store, sync)
}

fn cached_sources(sync: &CollectionSync<FakeStore>, id: &str) -> Vec<String> {
    let c = sync.cache().get(id).unwrap();
    source_ids(&c).into_iter().map(str::to_string).collect()
}

fn cached_ids(sync: &CollectionSync<FakeStore>) -> Vec<String> {
    sync.cache().snapshot().into_iter().map(|c| c.id).collect()
}

// ============================================================================
// Reload
// ============================================================================

#[tokio::test]
async fn test_reload_populates_cache() {
    let (_, sync) = setup(fixture()).await;
    assert_eq!(cached_ids(&sync), vec!["c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn test_superseded_reload_is_discarded() {
    let (store, sync) = setup(fixture()).await;
    let gate = store.hold("list_collections");

    let slow = sync.clone();
    let first = tokio::spawn(async move { slow.reload().await });
    gate.arrived().await;

    store.server_edit("c1", |c| c.name = "Renamed".to_string());
    assert!(sync.reload().await.unwrap());

    gate.release();
    assert!(!first.await.unwrap().unwrap());
    assert_eq!(sync.cache().get("c1").unwrap().name, "Renamed");
}

// ============================================================================
// Source membership
// ============================================================================

#[tokio::test]
async fn test_add_source_rolls_back_on_failure() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("add_source:c1:s9", 500);
    let gate = store.hold("add_source:c1:s9");

    let task = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.add_source("c1", "s9").await })
    };
    gate.arrived().await;
    // Visible while in flight
    assert_eq!(cached_sources(&sync, "c1"), vec!["s1", "s9"]);

    gate.release();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Api(ApiError::HttpStatus(500))));
    assert_eq!(cached_sources(&sync, "c1"), vec!["s1"]);
}

#[tokio::test]
async fn test_add_source_commits_on_success() {
    let (store, sync) = setup(fixture()).await;
    sync.add_source("c1", "s9").await.unwrap();

    assert_eq!(cached_sources(&sync, "c1"), vec!["s1", "s9"]);
    assert!(store.server_collection("c1").unwrap().contains_source("s9"));
}

#[tokio::test]
async fn test_add_existing_member_is_noop() {
    let (store, sync) = setup(fixture()).await;
    let calls = store.calls().len();
    let revision = sync.cache().revision();

    sync.add_source("c1", "s1").await.unwrap();

    assert_eq!(store.calls().len(), calls);
    assert_eq!(sync.cache().revision(), revision);
}

#[tokio::test]
async fn test_remove_source_rolls_back_on_failure() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("remove_source:c2:s2", 503);

    let err = sync.remove_source("c2", "s2").await.unwrap_err();
    assert!(matches!(err, SyncError::Api(ApiError::HttpStatus(503))));
    assert_eq!(cached_sources(&sync, "c2"), vec!["s2", "s3"]);
}

#[tokio::test]
async fn test_remove_source_commits_on_success() {
    let (store, sync) = setup(fixture()).await;
    sync.remove_source("c2", "s2").await.unwrap();

    assert_eq!(cached_sources(&sync, "c2"), vec!["s3"]);
    assert!(!store.server_collection("c2").unwrap().contains_source("s2"));
}

#[tokio::test]
async fn test_membership_changes_require_ownership() {
    let (store, sync) = setup(fixture()).await;
    let calls = store.calls().len();

    let add = sync.add_source("c3", "s9").await.unwrap_err();
    let remove = sync.remove_source("c3", "s4").await.unwrap_err();

    assert!(matches!(add, SyncError::NotPermitted(_)));
    assert!(matches!(remove, SyncError::NotPermitted(_)));
    assert_eq!(store.calls().len(), calls);
    assert_eq!(cached_sources(&sync, "c3"), vec!["s4"]);
}

#[tokio::test]
async fn test_unknown_collection_is_not_found() {
    let (_, sync) = setup(fixture()).await;
    let err = sync.add_source("missing", "s1").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(id) if id == "missing"));
}

/// Overlapping mutations of the same field resolve last-write-wins: the
/// failed request's rollback restores the list it saw when it started and
/// drops the concurrent successful add until the next reload.
#[tokio::test]
async fn test_overlapping_rollback_is_last_write_wins() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("add_source:c1:s2", 500);
    let gate = store.hold("add_source:c1:s2");

    let failing = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.add_source("c1", "s2").await })
    };
    gate.arrived().await;

    sync.add_source("c1", "s3").await.unwrap();
    assert_eq!(cached_sources(&sync, "c1"), vec!["s1", "s2", "s3"]);

    gate.release();
    assert!(failing.await.unwrap().is_err());

    // s3 is on the server but lost locally
    assert_eq!(cached_sources(&sync, "c1"), vec!["s1"]);
    assert!(store.server_collection("c1").unwrap().contains_source("s3"));

    sync.reload().await.unwrap();
    assert_eq!(cached_sources(&sync, "c1"), vec!["s1", "s3"]);
}

// ============================================================================
// Create / edit
// ============================================================================

#[tokio::test]
async fn test_create_collection_adds_server_document() {
    let (store, sync) = setup(fixture()).await;
    let sources = vec!["s2".to_string(), "s1".to_string(), "s2".to_string()];
    let created = sync
        .create_collection("  Morning   reads ", " daily ", false, &sources)
        .await
        .unwrap();

    assert_eq!(created.name, "Morning reads");
    assert_eq!(created.description, "daily");
    assert_eq!(source_ids(&created), vec!["s1", "s2"]);
    assert!(sync.cache().contains(&created.id));
    assert!(store.server_collection(&created.id).is_some());
}

#[tokio::test]
async fn test_create_with_blank_name_is_rejected_locally() {
    let (store, sync) = setup(fixture()).await;
    let calls = store.calls().len();

    let err = sync.create_collection(" \t ", "", true, &[]).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidName));
    assert_eq!(store.calls().len(), calls);
}

#[tokio::test]
async fn test_create_failure_leaves_cache_untouched() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("create_collection", 500);

    assert!(sync.create_collection("News", "", true, &[]).await.is_err());
    assert_eq!(sync.cache().len(), 4);
}

#[tokio::test]
async fn test_update_details_rolls_back_on_failure() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("update_collection:c1", 500);

    let details = CollectionDetails {
        name: "Renamed".to_string(),
        description: "new".to_string(),
        is_public: false,
    };
    assert!(sync.update_details("c1", details).await.is_err());

    let c1 = sync.cache().get("c1").unwrap();
    assert_eq!(c1.name, "C1");
    assert!(c1.is_public);
}

#[tokio::test]
async fn test_update_details_commits() {
    let (store, sync) = setup(fixture()).await;
    let details = CollectionDetails {
        name: "World news".to_string(),
        description: String::new(),
        is_public: false,
    };
    sync.update_details("c1", details).await.unwrap();

    assert_eq!(sync.cache().get("c1").unwrap().name, "World news");
    assert_eq!(store.server_collection("c1").unwrap().name, "World news");
}

// ============================================================================
// Delete and tombstones
// ============================================================================

#[tokio::test]
async fn test_delete_hides_collection_immediately() {
    let (store, sync) = setup(fixture()).await;
    let gate = store.hold("delete_collection:c1");

    let task = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.delete_collection("c1").await })
    };
    gate.arrived().await;
    assert!(!sync.cache().contains("c1"));

    gate.release();
    task.await.unwrap().unwrap();
    assert!(!sync.cache().contains("c1"));
    assert!(store.server_collection("c1").is_none());
}

#[tokio::test]
async fn test_failed_delete_restores_in_place() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("delete_collection:c2", 500);

    assert!(sync.delete_collection("c2").await.is_err());
    assert_eq!(cached_ids(&sync), vec!["c1", "c2", "c3", "c4"]);
    assert!(!sync.cache().is_tombstoned("c2"));
}

#[tokio::test]
async fn test_delete_of_already_deleted_collection_succeeds() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("delete_collection:c1", 404);

    sync.delete_collection("c1").await.unwrap();
    assert!(!sync.cache().contains("c1"));
}

#[tokio::test]
async fn test_delete_requires_ownership() {
    let (_, sync) = setup(fixture()).await;
    let err = sync.delete_collection("c3").await.unwrap_err();
    assert!(matches!(err, SyncError::NotPermitted(_)));
    assert!(sync.cache().contains("c3"));
}

#[tokio::test]
async fn test_stale_reload_does_not_resurrect_deleted_collection() {
    let (store, sync) = setup(fixture()).await;
    let gate = store.hold("list_collections");

    // Reload issued before the delete; its response still contains c1
    let reload = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.reload().await })
    };
    gate.arrived().await;
    sync.delete_collection("c1").await.unwrap();

    gate.release();
    assert!(reload.await.unwrap().unwrap());
    assert!(!sync.cache().contains("c1"));
    assert!(sync.cache().is_tombstoned("c1"));

    // A reload issued after the acknowledged delete clears the tombstone
    sync.reload().await.unwrap();
    assert!(!sync.cache().is_tombstoned("c1"));
    assert_eq!(cached_ids(&sync), vec!["c2", "c3", "c4"]);
}

#[tokio::test]
async fn test_late_detail_fetch_does_not_resurrect_deleted_collection() {
    let (store, sync) = setup(fixture()).await;
    let guard = Arc::new(LoadGuard::new());
    let gate = store.hold("get_collection:c1");

    let detail = {
        let sync = sync.clone();
        let guard = Arc::clone(&guard);
        tokio::spawn(async move { sync.open_detail(&guard, "c1").await })
    };
    gate.arrived().await;
    sync.delete_collection("c1").await.unwrap();

    gate.release();
    assert_eq!(detail.await.unwrap().unwrap(), None);
    assert!(!sync.cache().contains("c1"));
}

// ============================================================================
// Detail loads
// ============================================================================

#[tokio::test]
async fn test_open_detail_refreshes_cache() {
    let (store, sync) = setup(fixture()).await;
    store.server_edit("c2", |c| c.name = "Fresh".to_string());
    let guard = LoadGuard::new();

    let loaded = sync.open_detail(&guard, "c2").await.unwrap().unwrap();
    assert_eq!(loaded.name, "Fresh");
    assert_eq!(sync.cache().get("c2").unwrap().name, "Fresh");
}

#[tokio::test]
async fn test_stale_detail_response_is_ignored() {
    let (store, sync) = setup(fixture()).await;
    store.server_edit("c1", |c| c.name = "Stale".to_string());
    let guard = Arc::new(LoadGuard::new());
    let gate = store.hold("get_collection:c1");

    let first = {
        let sync = sync.clone();
        let guard = Arc::clone(&guard);
        tokio::spawn(async move { sync.open_detail(&guard, "c1").await })
    };
    gate.arrived().await;

    // The surface moves on to c2 before c1 answers
    let second = sync.open_detail(&guard, "c2").await.unwrap();
    assert_eq!(second.map(|c| c.id), Some("c2".to_string()));

    gate.release();
    assert_eq!(first.await.unwrap().unwrap(), None);
    assert_eq!(sync.cache().get("c1").unwrap().name, "C1");
}

#[tokio::test]
async fn test_released_guard_drops_response() {
    let (store, sync) = setup(fixture()).await;
    let guard = Arc::new(LoadGuard::new());
    let gate = store.hold("get_collection:c2");

    let task = {
        let sync = sync.clone();
        let guard = Arc::clone(&guard);
        tokio::spawn(async move { sync.open_detail(&guard, "c2").await })
    };
    gate.arrived().await;
    guard.release();
    gate.release();

    assert_eq!(task.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_open_detail_of_missing_collection() {
    let (_, sync) = setup(fixture()).await;
    let guard = LoadGuard::new();
    let err = sync.open_detail(&guard, "nope").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

// ============================================================================
// Follow
// ============================================================================

#[tokio::test]
async fn test_follow_and_unfollow() {
    let (store, sync) = setup(fixture()).await;

    sync.follow("c3").await.unwrap();
    assert!(sync.cache().get("c3").unwrap().is_followed);

    sync.unfollow("c3").await.unwrap();
    assert!(!sync.cache().get("c3").unwrap().is_followed);
    assert_eq!(
        store.calls()[1..].to_vec(),
        vec!["follow:c3".to_string(), "unfollow:c3".to_string()]
    );
}

#[tokio::test]
async fn test_follow_rolls_back_on_failure() {
    let (store, sync) = setup(fixture()).await;
    store.fail_once("follow:c3", 502);

    assert!(sync.follow("c3").await.is_err());
    assert!(!sync.cache().get("c3").unwrap().is_followed);
}

#[tokio::test]
async fn test_follow_refused_for_own_or_private() {
    let (_, sync) = setup(fixture()).await;
    assert!(matches!(
        sync.follow("c1").await.unwrap_err(),
        SyncError::NotPermitted(_)
    ));
    assert!(matches!(
        sync.follow("c4").await.unwrap_err(),
        SyncError::NotPermitted(_)
    ));
}

#[tokio::test]
async fn test_refresh_follow_status() {
    let (store, sync) = setup(fixture()).await;
    sync.follow("c3").await.unwrap();
    // Unfollowed from another device
    store.set_following("c3", false);

    let guard = LoadGuard::new();
    let status = sync.refresh_follow_status(&guard, "c3").await.unwrap();
    assert_eq!(status, Some(false));
    assert!(!sync.cache().get("c3").unwrap().is_followed);
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn test_rollback_is_broadcast() {
    let (store, sync) = setup(fixture()).await;
    let mut events = sync.cache().subscribe();
    store.fail_once("add_source:c1:s9", 500);

    assert!(sync.add_source("c1", "s9").await.is_err());

    let changed = CacheEvent::SourcesChanged {
        collection_id: "c1".to_string(),
    };
    assert_eq!(events.try_recv().unwrap(), changed);
    assert_eq!(events.try_recv().unwrap(), changed);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_delete_and_restore_are_broadcast() {
    let (store, sync) = setup(fixture()).await;
    let mut events = sync.cache().subscribe();
    store.fail_once("delete_collection:c1", 500);

    assert!(sync.delete_collection("c1").await.is_err());

    assert_eq!(
        events.try_recv().unwrap(),
        CacheEvent::Removed {
            collection_id: "c1".to_string()
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        CacheEvent::Restored {
            collection_id: "c1".to_string()
        }
    );
}
