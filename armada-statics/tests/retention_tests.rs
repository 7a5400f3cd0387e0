//! Integration tests for version retention and failure cleanup.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use armada_statics::{cleanup_after_failure, CleanupOutcome, RetentionManager, StaticsError};
use rstest::rstest;

use common::{synchronizer, MemoryStore};

fn seed_versions(store: &MemoryStore, versions: &[u64]) {
    for v in versions {
        store.seed(&format!("fly-statics/web/{v}/0/index.html"), "<html>");
        store.seed(&format!("fly-statics/web/{v}/1/app.js"), "js");
    }
}

fn remaining_versions(store: &MemoryStore) -> BTreeSet<u64> {
    store
        .keys_under("fly-statics/web/")
        .iter()
        .filter_map(|k| k.split('/').nth(2)?.parse().ok())
        .collect()
}

fn manager(store: &std::sync::Arc<MemoryStore>, keep: usize) -> RetentionManager {
    RetentionManager::new(synchronizer(store, 5), "fly-statics", keep)
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[rstest]
#[case::keeps_newest_three(&[1, 2, 3, 4, 5, 6, 7], 7, 3, &[5, 6, 7])]
#[case::future_versions_always_go(&[1, 2, 10], 3, 3, &[1, 2])]
#[case::under_threshold_untouched(&[4, 5], 5, 3, &[4, 5])]
#[case::future_and_expired(&[1, 2, 3, 4, 8, 9], 4, 2, &[3, 4])]
#[case::keep_one(&[1, 2, 3], 3, 1, &[3])]
#[case::zero_keep_still_retains_current(&[5, 6, 7], 7, 0, &[7])]
#[tokio::test]
async fn retention_keeps_exactly_the_newest_valid_versions(
    #[case] existing: &[u64],
    #[case] current: u64,
    #[case] keep: usize,
    #[case] expected: &[u64],
) {
    let store = MemoryStore::new();
    seed_versions(&store, existing);

    manager(&store, keep)
        .delete_old_versions("web", current)
        .await
        .expect("retention");

    let expected: BTreeSet<u64> = expected.iter().copied().collect();
    assert_eq!(remaining_versions(&store), expected);
}

#[tokio::test]
async fn report_separates_future_and_expired_versions() {
    let store = MemoryStore::new();
    seed_versions(&store, &[1, 2, 3, 4, 5, 11, 12]);

    let report = manager(&store, 3)
        .delete_old_versions("web", 5)
        .await
        .expect("retention");

    assert_eq!(report.too_new, vec![11, 12]);
    assert_eq!(report.expired, vec![1, 2]);
    assert_eq!(report.deleted().count(), 4);
}

#[tokio::test]
async fn non_version_prefixes_and_other_apps_are_ignored() {
    let store = MemoryStore::new();
    seed_versions(&store, &[1, 2, 3, 4]);
    store.seed("fly-statics/web/latest/index.html", "x");
    store.seed("fly-statics/web/loose-file.txt", "x");
    store.seed("fly-statics/webapp/1/index.html", "x");

    manager(&store, 3)
        .delete_old_versions("web", 4)
        .await
        .expect("retention");

    let keys = store.keys();
    assert!(keys.contains(&"fly-statics/web/latest/index.html".to_string()));
    assert!(keys.contains(&"fly-statics/web/loose-file.txt".to_string()));
    assert!(keys.contains(&"fly-statics/webapp/1/index.html".to_string()));
    assert!(!keys.iter().any(|k| k.starts_with("fly-statics/web/1/")));
}

#[tokio::test]
async fn listing_failure_is_reported() {
    let store = MemoryStore::new();
    store.fail_lists();

    let err = manager(&store, 3)
        .delete_old_versions("web", 1)
        .await
        .unwrap_err();

    assert!(matches!(err, StaticsError::Store(_)));
}

// ---------------------------------------------------------------------------
// Failure cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_removes_only_the_failed_version() {
    let store = MemoryStore::new();
    seed_versions(&store, &[6, 7, 70]);

    let outcome = cleanup_after_failure(
        &synchronizer(&store, 5),
        "fly-statics/web/7",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(outcome, CleanupOutcome::Removed(2));
    assert_eq!(remaining_versions(&store), BTreeSet::from([6, 70]));
}

#[tokio::test]
async fn cleanup_failure_is_swallowed() {
    let store = MemoryStore::new();
    store.fail_lists();

    let outcome = cleanup_after_failure(
        &synchronizer(&store, 5),
        "fly-statics/web/7",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(outcome, CleanupOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_bounded_by_its_timeout() {
    let store = MemoryStore::new();
    seed_versions(&store, &[7]);
    store.set_list_delay(Duration::from_secs(60));

    let outcome = cleanup_after_failure(
        &synchronizer(&store, 5),
        "fly-statics/web/7",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(outcome, CleanupOutcome::TimedOut);
}
