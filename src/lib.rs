pub mod check;
pub mod config;
pub mod history;
pub mod level;
pub mod notify;
pub mod probe;
pub mod tree;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::AlertLevel;

/// One row of a tabular report.
pub type TableRow = Vec<String>;

/// Payload produced by a successful check run.
///
/// Three report shapes are supported; all of them run through the same
/// scheduling, escalation and persistence skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A single free-form report blob.
    Report(String),

    /// A set of tabular rows.
    Table(Vec<TableRow>),

    /// A scalar time-series sample.
    Sample(f64),
}

/// Outcome of one check run: either a payload or a failure description,
/// never both, never neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Success(Payload),
    Error(String),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Outcome::Error(msg) => Some(msg),
            Outcome::Success(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Success(payload) => Some(payload),
            Outcome::Error(_) => None,
        }
    }
}

/// Immutable record of one probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// When the run started
    pub timestamp: DateTime<Utc>,

    /// How long the check took
    pub latency_ms: u64,

    /// The alert level published after this run
    pub level: AlertLevel,

    /// Payload or failure description
    pub outcome: Outcome,
}

impl ProbeResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_error()
    }
}

/// A single published alert-level transition, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelChange {
    /// Path of the node/probe that changed
    pub path: String,

    /// Previously published level
    pub old: AlertLevel,

    /// Newly published level
    pub new: AlertLevel,

    /// Human-readable message from the classifier
    pub message: String,
}
