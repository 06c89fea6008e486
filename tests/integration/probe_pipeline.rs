//! End-to-end probe pipeline scenarios

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vigil::{
    Outcome, Payload,
    check::{CheckSpec, Classification},
    level::AlertLevel,
    notify::Multiplexer,
    probe::{ProbeCache, ProbeHandle},
    tree::NodeTree,
    writer::WriterHandle,
};

use super::helpers::{RecordingObserver, init_tracing, scripted_spec};

/// The canonical engine scenario: capacity 3, ramp enabled, targets
/// `[None, High, High, None]` from a fresh probe. Expected published
/// sequence `[None, Low, Medium, None]` (two ramp steps up, then immediate
/// drop), and the history keeps the 3 most recent results.
#[tokio::test]
async fn ramp_and_recovery_scenario() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let spec = scripted_spec(
        "scenario@probe",
        &[
            AlertLevel::None,
            AlertLevel::High,
            AlertLevel::High,
            AlertLevel::None,
        ],
    )
    .with_capacity(3);

    let handle = ProbeHandle::spawn("scenario/probe", spec, dir.path(), None).unwrap();

    let mut published = Vec::new();
    for _ in 0..4 {
        handle.run_now().await.unwrap();
        published.push(handle.current_level().await.unwrap());
    }

    assert_eq!(
        published,
        vec![
            AlertLevel::None,
            AlertLevel::Low,
            AlertLevel::Medium,
            AlertLevel::None
        ]
    );

    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 3);

    // Newest first: the last three published levels in reverse.
    let levels: Vec<AlertLevel> = history.iter().map(|r| r.level).collect();
    assert_eq!(
        levels,
        vec![AlertLevel::None, AlertLevel::Medium, AlertLevel::Low]
    );

    handle.shutdown().await.unwrap();
}

/// Level transitions surface as broadcast events carrying old level, new
/// level and the classifier message.
#[tokio::test]
async fn transitions_are_published_to_subscribers() {
    let dir = tempfile::tempdir().unwrap();

    let spec = scripted_spec("events@probe", &[AlertLevel::None, AlertLevel::High]);
    let handle = ProbeHandle::spawn("events/probe", spec, dir.path(), None).unwrap();
    let mut events = handle.subscribe();

    handle.run_now().await.unwrap();
    handle.run_now().await.unwrap();

    let vigil::probe::ProbeEvent::LevelChanged { old, new, .. } = events.recv().await.unwrap();
    assert_eq!((old, new), (AlertLevel::Unknown, AlertLevel::None));

    let vigil::probe::ProbeEvent::LevelChanged { old, new, message, .. } =
        events.recv().await.unwrap();
    assert_eq!((old, new), (AlertLevel::None, AlertLevel::Low));
    assert!(message.contains("high"));

    handle.shutdown().await.unwrap();
}

/// The full engine path: tree mounts a probe through the cache, the probe
/// runs, and the observer sees node-added, level-changed and node-removed
/// deliveries through the multiplexer.
#[tokio::test]
async fn tree_to_observer_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ProbeCache::new(dir.path(), WriterHandle::new()));
    let mux = Multiplexer::new(Duration::from_millis(10));
    let tree = NodeTree::new(cache, mux.clone());

    let observer = Arc::new(RecordingObserver::default());
    mux.register("dashboard", observer.clone());

    tree.add_leaf(
        "dc1/db",
        scripted_spec("mysql@db", &[AlertLevel::None, AlertLevel::High]),
    )
    .await
    .unwrap();

    // The attached probe schedules itself; let it converge on the scripted
    // steady state (None, then ramping to High).
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Two structural nodes appeared: dc1 and dc1/db.
    let added: usize = observer.added.lock().unwrap().iter().sum();
    assert_eq!(added, 2);

    // Leaf and ancestor transitions arrived (possibly batched).
    let changes = observer.changes_flat();
    assert!(changes.iter().any(|c| c.path == "dc1/db"));
    assert!(changes.iter().any(|c| c.path == "dc1"));
    assert_eq!(tree.level_of("dc1"), Some(AlertLevel::High));
    assert_eq!(tree.level_of("dc1/db"), Some(AlertLevel::High));

    tree.remove_leaf("dc1/db").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let removed: usize = observer.removed.lock().unwrap().iter().sum();
    assert_eq!(removed, 2);
    assert_eq!(tree.node_count(), 0);
}

/// Tabular checks run through the same skeleton; the row set is persisted
/// and classified like any other payload shape.
#[tokio::test]
async fn tabular_reports_flow_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();

    let spec = CheckSpec::new(
        "smart@disks",
        Arc::new(|_token| {
            Box::pin(async {
                Ok(Payload::Table(vec![
                    vec!["sda".to_string(), "PASSED".to_string()],
                    vec!["sdb".to_string(), "FAILED".to_string()],
                ]))
            })
        }),
        Arc::new(|outcome: &Outcome| match outcome.payload() {
            Some(Payload::Table(rows)) => {
                let failing = rows
                    .iter()
                    .filter(|row| row.iter().any(|cell| cell == "FAILED"))
                    .count();
                if failing > 0 {
                    Classification::new(AlertLevel::High, format!("{failing} device(s) failing"))
                } else {
                    Classification::new(AlertLevel::None, "all devices healthy")
                }
            }
            _ => Classification::new(AlertLevel::Critical, "no report"),
        }),
    );

    let handle = ProbeHandle::spawn("disks/smart", spec, dir.path(), None).unwrap();

    // First run: High replaces the initial Unknown immediately.
    handle.run_now().await.unwrap();
    assert_eq!(handle.current_level().await.unwrap(), AlertLevel::High);
    assert_eq!(
        handle.current_message().await.unwrap(),
        "1 device(s) failing"
    );

    let history = handle.history().await.unwrap();
    assert!(matches!(
        history[0].outcome.payload(),
        Some(Payload::Table(rows)) if rows.len() == 2
    ));

    handle.shutdown().await.unwrap();
}

/// A run whose published level does not change emits no event.
#[tokio::test]
async fn steady_levels_stay_quiet() {
    let dir = tempfile::tempdir().unwrap();

    let spec = scripted_spec("quiet@probe", &[AlertLevel::None]);
    let handle = ProbeHandle::spawn("quiet/probe", spec, dir.path(), None).unwrap();
    let mut events = handle.subscribe();

    for _ in 0..3 {
        handle.run_now().await.unwrap();
    }

    // Exactly one transition: the initial Unknown -> None.
    let first = events.try_recv();
    assert!(first.is_ok());
    assert!(events.try_recv().is_err());

    handle.shutdown().await.unwrap();
}
