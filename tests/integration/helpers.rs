//! Test helpers and utilities for integration tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use vigil::{
    LevelChange, Outcome, Payload,
    check::{CheckSpec, Classification, DelayPolicy},
    level::AlertLevel,
    notify::Observer,
};

/// Install a compact stderr subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(false)
        .try_init();
}

/// Delay policy that keeps scheduled tests fast.
pub fn quick_policy() -> DelayPolicy {
    Arc::new(|_, _| Duration::from_millis(10))
}

/// A check that always succeeds with a scalar sample and classifies every
/// outcome as `level`.
pub fn steady_spec(identity: &str, level: AlertLevel) -> CheckSpec {
    CheckSpec::new(
        identity,
        Arc::new(|_token| Box::pin(async { Ok(Payload::Sample(1.0)) })),
        Arc::new(move |_outcome: &Outcome| Classification::new(level, "steady")),
    )
    .with_delay_policy(quick_policy())
}

/// A check whose classifier walks a scripted sequence of target levels,
/// repeating the final entry once the script runs out.
pub fn scripted_spec(identity: &str, targets: &[AlertLevel]) -> CheckSpec {
    let script: Arc<Mutex<VecDeque<AlertLevel>>> =
        Arc::new(Mutex::new(targets.iter().copied().collect()));
    let last = *targets.last().expect("script must not be empty");

    CheckSpec::new(
        identity,
        Arc::new(|_token| Box::pin(async { Ok(Payload::Sample(1.0)) })),
        Arc::new(move |_outcome: &Outcome| {
            let target = script.lock().unwrap().pop_front().unwrap_or(last);
            Classification::new(target, format!("target {target}"))
        }),
    )
    .with_delay_policy(quick_policy())
}

/// Observer that records every delivery together with its arrival time.
#[derive(Default)]
pub struct RecordingObserver {
    pub added: Mutex<Vec<usize>>,
    pub removed: Mutex<Vec<usize>>,
    pub change_batches: Mutex<Vec<(Instant, Vec<LevelChange>)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingObserver {
    pub fn changes_flat(&self) -> Vec<LevelChange> {
        self.change_batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, batch)| batch.clone())
            .collect()
    }

    pub fn delivery_times(&self) -> Vec<Instant> {
        self.change_batches
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    async fn on_nodes_added(&self, count: usize) -> anyhow::Result<()> {
        self.added.lock().unwrap().push(count);
        Ok(())
    }

    async fn on_nodes_removed(&self, count: usize) -> anyhow::Result<()> {
        self.removed.lock().unwrap().push(count);
        Ok(())
    }

    async fn on_levels_changed(&self, changes: Vec<LevelChange>) -> anyhow::Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("observer gone");
        }
        self.change_batches
            .lock()
            .unwrap()
            .push((Instant::now(), changes));
        Ok(())
    }
}
