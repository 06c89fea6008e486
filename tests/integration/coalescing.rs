//! Background writer coalescing behavior

use vigil::writer::{WriterHandle, staging_pair};

/// Two writes for the same target queued back to back: exactly one write
/// reaches the disk, and it carries the newest payload.
#[tokio::test]
async fn second_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let (path, staging) = staging_pair(dir.path().join("status"));

    let writer = WriterHandle::new();

    // Both enqueued before the worker gets a chance to run (no await in
    // between on the current-thread test runtime).
    writer.enqueue(&path, &staging, b"first".to_vec());
    writer.enqueue(&path, &staging, b"second".to_vec());

    writer.flush().await;

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    assert!(!staging.exists());
}

/// Coalescing one hot file must not starve other queued files.
#[tokio::test]
async fn distinct_targets_all_get_written() {
    let dir = tempfile::tempdir().unwrap();
    let writer = WriterHandle::new();

    let targets: Vec<_> = (0..5)
        .map(|n| staging_pair(dir.path().join(format!("file-{n}"))))
        .collect();

    for (n, (path, staging)) in targets.iter().enumerate() {
        writer.enqueue(path, staging, format!("v1-{n}").into_bytes());
    }
    // Hot file updated repeatedly while the rest are still queued.
    let (hot, hot_staging) = &targets[0];
    writer.enqueue(hot, hot_staging, b"v2-0".to_vec());
    writer.enqueue(hot, hot_staging, b"v3-0".to_vec());

    writer.flush().await;

    assert_eq!(std::fs::read(hot).unwrap(), b"v3-0");
    for (n, (path, _)) in targets.iter().enumerate().skip(1) {
        assert_eq!(std::fs::read(path).unwrap(), format!("v1-{n}").into_bytes());
    }
}

/// The staging pair convention: `<name>` committed via `<name>.new`.
#[tokio::test]
async fn staging_file_is_renamed_away() {
    let dir = tempfile::tempdir().unwrap();
    let (path, staging) = staging_pair(dir.path().join("report"));
    assert_eq!(staging, dir.path().join("report.new"));

    let writer = WriterHandle::new();
    writer.enqueue(&path, &staging, b"payload".to_vec());
    writer.flush().await;

    assert!(path.exists());
    assert!(!staging.exists());
}

/// Repeated bursts across drain cycles keep converging on the newest
/// payload.
#[tokio::test]
async fn repeated_bursts_converge() {
    let dir = tempfile::tempdir().unwrap();
    let (path, staging) = staging_pair(dir.path().join("state"));
    let writer = WriterHandle::new();

    for round in 0..3 {
        for n in 0..10 {
            writer.enqueue(&path, &staging, format!("round {round} v{n}").into_bytes());
        }
        writer.flush().await;
        assert_eq!(
            std::fs::read(&path).unwrap(),
            format!("round {round} v9").into_bytes()
        );
    }
}
