//! Alert severity domain and the escalation (ramp) algorithm.

use serde::{Deserialize, Serialize};

/// Ordered alert severity.
///
/// `Unknown` sorts above `Critical` so that "most severe wins" reductions
/// keep a never-successfully-probed resource on top, but it is not part of
/// the single-step ramp sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
    #[default]
    Unknown,
}

impl AlertLevel {
    /// Advance one position in the `None..Critical` ordering.
    ///
    /// `Critical` is the ceiling; `Unknown` is never produced by stepping.
    pub fn step_up(self) -> AlertLevel {
        match self {
            AlertLevel::None => AlertLevel::Low,
            AlertLevel::Low => AlertLevel::Medium,
            AlertLevel::Medium => AlertLevel::High,
            AlertLevel::High => AlertLevel::Critical,
            AlertLevel::Critical => AlertLevel::Critical,
            AlertLevel::Unknown => AlertLevel::Unknown,
        }
    }

    /// Compute the next published level from the current one and a freshly
    /// classified target.
    ///
    /// Rising severity ramps one step per run (when `ramp` is set) so a
    /// single bad sample cannot paint a resource `Critical` outright;
    /// recovery is always immediate. A target of `Unknown` is applied
    /// immediately regardless of `ramp`.
    pub fn escalate(cur: AlertLevel, target: AlertLevel, ramp: bool) -> AlertLevel {
        if target == AlertLevel::Unknown {
            return AlertLevel::Unknown;
        }

        if target < cur {
            return target;
        }

        if cur < target && ramp {
            return cur.step_up();
        }

        target
    }

    /// Floor the classified level of an errored run.
    ///
    /// Errors surface as at least `Critical`, except that a currently
    /// `Unknown` probe stays `Unknown` rather than "improving" to
    /// `Critical`.
    pub fn error_floor(cur: AlertLevel, classified: AlertLevel) -> AlertLevel {
        if cur == AlertLevel::Unknown {
            return AlertLevel::Unknown;
        }

        classified.max(AlertLevel::Critical)
    }

    pub fn is_unknown(self) -> bool {
        self == AlertLevel::Unknown
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlertLevel::None => "none",
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
            AlertLevel::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}
