//! Message types for probe actor communication
//!
//! Commands are request/response messages sent to one probe via mpsc;
//! events are broadcast notifications published for the node tree and
//! other subscribers.

use tokio::sync::oneshot;

use crate::{ProbeResult, level::AlertLevel};

/// Commands that can be sent to a probe actor
#[derive(Debug)]
pub enum ProbeCommand {
    /// Attach one observer; the probe schedule runs while at least one
    /// observer is attached. Responds with the new observer count.
    Attach { respond_to: oneshot::Sender<usize> },

    /// Detach one observer. Detaching the last observer stops scheduling
    /// but keeps the probe, its history and its published level.
    Detach { respond_to: oneshot::Sender<usize> },

    /// Fetch the retained history, newest first.
    History {
        respond_to: oneshot::Sender<Vec<ProbeResult>>,
    },

    /// Fetch the currently published alert level.
    CurrentLevel {
        respond_to: oneshot::Sender<AlertLevel>,
    },

    /// Fetch the message accompanying the current level.
    CurrentMessage { respond_to: oneshot::Sender<String> },

    /// Run the check immediately, bypassing the sleep.
    ///
    /// Used for testing and manual refresh operations.
    RunNow { respond_to: oneshot::Sender<()> },

    /// Gracefully shut down the probe actor.
    Shutdown,
}

/// Event published when a probe's published alert level transitions
///
/// Broadcast to all subscribers (node tree, tests). The channel may lag for
/// slow subscribers; transitions are also recoverable from the history.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    LevelChanged {
        /// Probe path (cache key)
        path: String,

        /// Previously published level
        old: AlertLevel,

        /// Newly published level
        new: AlertLevel,

        /// Classifier message for the transition
        message: String,
    },
}
