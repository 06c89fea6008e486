//! ProbeActor - executes one resource check on its own schedule
//!
//! Each monitored resource gets its own probe actor. The actor owns the
//! check descriptor, the durable history ring and the published alert
//! level, and runs until shut down.
//!
//! ## Message Flow
//!
//! ```text
//! Sleep elapses → run check (bounded) → classify → escalate → append history
//!     ↑                                                        → publish LevelChanged
//!     └─── Commands (Attach, Detach, History, RunNow, Shutdown)
//! ```
//!
//! The schedule only runs while at least one observer is attached; a probe
//! with zero observers serves queries but never re-arms its timer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    Outcome, Payload, ProbeResult,
    check::{CheckSpec, Classification},
    history::HistoryStore,
    level::AlertLevel,
    writer::{WriterHandle, staging_pair},
};

use super::messages::{ProbeCommand, ProbeEvent};

/// Actor that periodically executes a single resource check
pub struct ProbeActor {
    /// Probe path (cache key), used for event payloads and state files
    path: String,

    /// Check descriptor supplied by the resource-specific collaborator
    spec: CheckSpec,

    /// Durable bounded history
    history: HistoryStore,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<ProbeCommand>,

    /// Broadcast sender for level transitions
    event_tx: broadcast::Sender<ProbeEvent>,

    /// Attached observer count; the schedule runs iff > 0
    observers: usize,

    /// Currently published alert level
    current: AlertLevel,

    /// Message accompanying the current level
    message: String,

    /// Whether the most recent run succeeded
    last_ok: bool,

    /// Whole-file "last report" persistence for report-shaped probes
    writer: Option<WriterHandle>,

    /// Final path of the last-report file
    report_path: PathBuf,
}

impl ProbeActor {
    fn new(
        path: String,
        spec: CheckSpec,
        history: HistoryStore,
        command_rx: mpsc::Receiver<ProbeCommand>,
        event_tx: broadcast::Sender<ProbeEvent>,
        writer: Option<WriterHandle>,
        report_path: PathBuf,
    ) -> Self {
        // Resume the published level from the durable history so a restart
        // does not re-announce a long-standing condition as new.
        let (current, last_ok, message) = match history.latest() {
            Some(latest) => (
                latest.level,
                !latest.is_error(),
                latest
                    .outcome
                    .error_message()
                    .unwrap_or_default()
                    .to_string(),
            ),
            None => (AlertLevel::Unknown, false, String::new()),
        };

        Self {
            path,
            spec,
            history,
            command_rx,
            event_tx,
            observers: 0,
            current,
            message,
            last_ok,
            writer,
            report_path,
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(probe = %self.path))]
    pub async fn run(mut self) {
        debug!("starting probe actor");

        let mut next_run = Instant::now();

        loop {
            tokio::select! {
                _ = time::sleep_until(next_run), if self.observers > 0 => {
                    self.execute_once().await;
                    next_run = Instant::now() + (self.spec.delay_policy)(self.last_ok, self.current);
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ProbeCommand::Attach { respond_to }) => {
                            let was_idle = self.observers == 0;
                            self.observers += 1;
                            if was_idle {
                                trace!("first observer attached, scheduling run");
                                next_run = Instant::now();
                            }
                            let _ = respond_to.send(self.observers);
                        }

                        Some(ProbeCommand::Detach { respond_to }) => {
                            self.observers = self.observers.saturating_sub(1);
                            if self.observers == 0 {
                                trace!("last observer detached, going idle");
                            }
                            let _ = respond_to.send(self.observers);
                        }

                        Some(ProbeCommand::History { respond_to }) => {
                            let _ = respond_to.send(self.history.list());
                        }

                        Some(ProbeCommand::CurrentLevel { respond_to }) => {
                            let _ = respond_to.send(self.current);
                        }

                        Some(ProbeCommand::CurrentMessage { respond_to }) => {
                            let _ = respond_to.send(self.message.clone());
                        }

                        Some(ProbeCommand::RunNow { respond_to }) => {
                            debug!("received RunNow command");
                            self.execute_once().await;
                            let _ = respond_to.send(());
                        }

                        Some(ProbeCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("probe actor stopped");
    }

    /// Execute one check run and publish its consequences.
    ///
    /// Check failures and timeouts become error results; nothing that
    /// happens here escapes the scheduling loop.
    #[instrument(skip(self), fields(probe = %self.path))]
    async fn execute_once(&mut self) {
        let token = CancellationToken::new();
        let timestamp = Utc::now();
        let started = std::time::Instant::now();

        let outcome = match time::timeout(self.spec.timeout, (self.spec.run)(token.clone())).await
        {
            Ok(Ok(payload)) => Outcome::Success(payload),
            Ok(Err(e)) => Outcome::Error(format!("{e:#}")),
            Err(_) => {
                // Best-effort cancellation; the check is asked to stop and
                // the probe moves on immediately.
                token.cancel();
                Outcome::Error(format!(
                    "check timed out after {}s",
                    self.spec.timeout.as_secs()
                ))
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        self.last_ok = !outcome.is_error();

        let Classification { level, message } = (self.spec.classify)(&outcome);

        // Error targets bypass the ramp: a failing resource must surface at
        // no less than Critical right away (Unknown stays Unknown).
        let (target, ramp) = if outcome.is_error() {
            (AlertLevel::error_floor(self.current, level), false)
        } else {
            (level, self.spec.ramp)
        };

        let next = AlertLevel::escalate(self.current, target, ramp);

        trace!(
            "run finished in {latency_ms}ms: target {target}, {} -> {next}",
            self.current
        );

        let result = ProbeResult {
            timestamp,
            latency_ms,
            level: next,
            outcome,
        };

        if let Err(e) = self.history.append(&result) {
            error!("failed to append history entry: {e}");
        }

        self.persist_last_report(&result);

        if next != self.current {
            let old = self.current;
            self.current = next;
            self.message = message;

            debug!("alert level changed: {old} -> {next} ({})", self.message);

            // It's OK if there are no subscribers.
            let _ = self.event_tx.send(ProbeEvent::LevelChanged {
                path: self.path.clone(),
                old,
                new: next,
                message: self.message.clone(),
            });
        } else {
            self.message = message;
        }
    }

    /// Report-shaped probes keep a whole-file copy of the latest report,
    /// committed through the coalescing writer.
    fn persist_last_report(&self, result: &ProbeResult) {
        let (Some(writer), Outcome::Success(Payload::Report(blob))) =
            (&self.writer, &result.outcome)
        else {
            return;
        };

        let (final_path, staging_path) = staging_pair(&self.report_path);
        writer.enqueue(final_path, staging_path, blob.clone().into_bytes());
    }
}

/// Handle for controlling a probe actor
///
/// This handle provides a typed API for sending commands to the actor.
/// It can be cloned and shared across tasks.
#[derive(Clone, Debug)]
pub struct ProbeHandle {
    sender: mpsc::Sender<ProbeCommand>,
    event_tx: broadcast::Sender<ProbeEvent>,
    path: String,
    identity: String,
}

impl ProbeHandle {
    /// Open the probe's history ring and spawn the actor.
    ///
    /// State lives under `state_dir`: `<sanitized path>.hist` for the ring
    /// and `<sanitized path>.report` for the last-report file.
    pub fn spawn(
        path: &str,
        spec: CheckSpec,
        state_dir: &Path,
        writer: Option<WriterHandle>,
    ) -> Result<Self> {
        let file_stem = sanitize_path(path);
        let history = HistoryStore::open(state_dir.join(format!("{file_stem}.hist")), spec.capacity)
            .with_context(|| format!("failed to open history for probe {path}"))?;
        let report_path = state_dir.join(format!("{file_stem}.report"));

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(64);

        let identity = spec.identity.clone();

        let actor = ProbeActor::new(
            path.to_string(),
            spec,
            history,
            cmd_rx,
            event_tx.clone(),
            writer,
            report_path,
        );

        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            event_tx,
            path: path.to_string(),
            identity,
        })
    }

    /// Attach an observer; returns the new observer count.
    pub async fn attach(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::Attach { respond_to: tx })
            .await
            .context("failed to send Attach command")?;
        rx.await.context("failed to receive response")
    }

    /// Detach an observer; returns the remaining count.
    pub async fn detach(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::Detach { respond_to: tx })
            .await
            .context("failed to send Detach command")?;
        rx.await.context("failed to receive response")
    }

    /// Retained history, newest first.
    pub async fn history(&self) -> Result<Vec<ProbeResult>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::History { respond_to: tx })
            .await
            .context("failed to send History command")?;
        rx.await.context("failed to receive response")
    }

    /// Currently published alert level.
    pub async fn current_level(&self) -> Result<AlertLevel> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::CurrentLevel { respond_to: tx })
            .await
            .context("failed to send CurrentLevel command")?;
        rx.await.context("failed to receive response")
    }

    /// Message accompanying the current level.
    pub async fn current_message(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::CurrentMessage { respond_to: tx })
            .await
            .context("failed to send CurrentMessage command")?;
        rx.await.context("failed to receive response")
    }

    /// Run the check immediately, bypassing the sleep.
    pub async fn run_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;
        rx.await.context("failed to receive response")
    }

    /// Subscribe to level transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.event_tx.subscribe()
    }

    /// Gracefully shut down the probe actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ProbeCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Flatten a probe path into a file stem.
///
/// The checksum suffix keeps stems unique even when flattening collides
/// (e.g. `a/b` vs `a_b`).
fn sanitize_path(path: &str) -> String {
    let stem: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{stem}-{:08x}",
        crate::history::record::crc32(path.as_bytes())
    )
}
