//! Probe cache identity guarantees

use std::sync::Arc;

use assert_matches::assert_matches;
use vigil::{
    level::AlertLevel,
    probe::{CacheError, ProbeCache},
    writer::WriterHandle,
};

use super::helpers::steady_spec;

/// Two requests for the same key with agreeing identity share one probe.
#[tokio::test]
async fn agreeing_identity_shares_the_instance() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ProbeCache::new(dir.path(), WriterHandle::new());

    let first = cache
        .get_or_create("net/uplink", steady_spec("ping@uplink", AlertLevel::None))
        .unwrap();
    let second = cache
        .get_or_create("net/uplink", steady_spec("ping@uplink", AlertLevel::None))
        .unwrap();

    assert_eq!(cache.len(), 1);

    // One underlying check execution and one history.
    first.run_now().await.unwrap();
    assert_eq!(second.history().await.unwrap().len(), 1);

    first.shutdown().await.unwrap();
}

/// Disagreeing identity on the same key is a configuration fault.
#[tokio::test]
async fn disagreeing_identity_raises() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ProbeCache::new(dir.path(), WriterHandle::new());

    cache
        .get_or_create("net/uplink", steady_spec("ping@uplink", AlertLevel::None))
        .unwrap();

    let err = cache
        .get_or_create("net/uplink", steady_spec("bgp@uplink", AlertLevel::None))
        .unwrap_err();

    assert_matches!(err, CacheError::IdentityConflict { .. });

    let rendered = err.to_string();
    assert!(rendered.contains("ping@uplink"));
    assert!(rendered.contains("bgp@uplink"));
}

/// The first caller's construction arguments win.
#[tokio::test]
async fn first_construction_arguments_win() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ProbeCache::new(dir.path(), WriterHandle::new());

    let first = cache
        .get_or_create(
            "db/replica",
            steady_spec("mysql@replica", AlertLevel::High).with_capacity(3),
        )
        .unwrap();

    // Later caller asks for a different capacity; the cached instance keeps
    // the original one.
    let second = cache
        .get_or_create(
            "db/replica",
            steady_spec("mysql@replica", AlertLevel::High).with_capacity(1000),
        )
        .unwrap();

    for _ in 0..5 {
        second.run_now().await.unwrap();
    }
    assert_eq!(first.history().await.unwrap().len(), 3);

    first.shutdown().await.unwrap();
}

/// Concurrent lookups race to a single instance.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_converge() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ProbeCache::new(dir.path(), WriterHandle::new()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            cache
                .get_or_create("fs/root", steady_spec("df@root", AlertLevel::None))
                .map(|_| ())
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(cache.len(), 1);
}
