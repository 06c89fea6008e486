//! Check contract between the engine and resource-specific collaborators.
//!
//! A check is described declaratively: an async `run` function that produces
//! a [`Payload`] (and cooperates with a cancellation token), a pure
//! `classify` function that maps an outcome to a target alert level plus
//! message, and a handful of knobs (timeout, history capacity, ramp flag,
//! sleep-delay policy). The probe engine is generic over this descriptor, so
//! a new resource kind is a value, not a new engine variant.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{Outcome, Payload, level::AlertLevel};

/// Default bounded wait for one check run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Shorter bound for liveness-style checks.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Default history capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Delay before the next run while the probe is failing or non-`None`.
pub const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Delay before the next run while the probe is healthy.
pub const HEALTHY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Target level and message produced by a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub level: AlertLevel,
    pub message: String,
}

impl Classification {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// The async check function. Must poll or select on the token and stop on
/// a best-effort basis once it is cancelled.
pub type CheckFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<Payload>> + Send + Sync>;

/// Maps an outcome (payload or error) to a target level and message.
pub type ClassifyFn = Arc<dyn Fn(&Outcome) -> Classification + Send + Sync>;

/// Computes the delay until the next run from `(last run succeeded, published level)`.
pub type DelayPolicy = Arc<dyn Fn(bool, AlertLevel) -> Duration + Send + Sync>;

/// Descriptor for one resource-specific check.
#[derive(Clone)]
pub struct CheckSpec {
    /// Logical resource identity. Two requests for the same cache key must
    /// agree on this; a mismatch is a configuration fault.
    pub identity: String,

    /// The check itself
    pub run: CheckFn,

    /// Outcome classifier
    pub classify: ClassifyFn,

    /// Bounded wait for one run
    pub timeout: Duration,

    /// History ring capacity
    pub capacity: usize,

    /// Whether rising severity ramps one step per run
    pub ramp: bool,

    /// Sleep-delay policy between runs
    pub delay_policy: DelayPolicy,
}

impl CheckSpec {
    pub fn new(identity: impl Into<String>, run: CheckFn, classify: ClassifyFn) -> Self {
        Self {
            identity: identity.into(),
            run,
            classify,
            timeout: DEFAULT_TIMEOUT,
            capacity: DEFAULT_CAPACITY,
            ramp: true,
            delay_policy: default_delay_policy(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Disable the one-step ramp; targets are published outright.
    pub fn without_ramp(mut self) -> Self {
        self.ramp = false;
        self
    }

    pub fn with_delay_policy(mut self, policy: DelayPolicy) -> Self {
        self.delay_policy = policy;
        self
    }
}

impl std::fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckSpec")
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .field("capacity", &self.capacity)
            .field("ramp", &self.ramp)
            .finish_non_exhaustive()
    }
}

/// Retry quickly while failing or non-`None`, back off while healthy.
pub fn default_delay_policy() -> DelayPolicy {
    Arc::new(|last_ok, level| {
        if !last_ok || level > AlertLevel::None {
            RETRY_DELAY
        } else {
            HEALTHY_DELAY
        }
    })
}

/// Same shape as [`default_delay_policy`], with the delays taken from an
/// engine configuration.
pub fn config_delay_policy(config: &crate::config::EngineConfig) -> DelayPolicy {
    let retry = Duration::from_secs(config.retry_delay_secs);
    let healthy = Duration::from_secs(config.healthy_delay_secs);

    Arc::new(move |last_ok, level| {
        if !last_ok || level > AlertLevel::None {
            retry
        } else {
            healthy
        }
    })
}
