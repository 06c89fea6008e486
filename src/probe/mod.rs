//! Self-scheduling probe engine
//!
//! Every monitored resource is served by one probe actor running as an
//! independent async task, deduplicated through the cache.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │    Node Tree    │
//!                    └────────┬────────┘
//!                             │ get_or_create(path)
//!                   ┌─────────▼─────────┐
//!                   │    ProbeCache     │
//!                   └─────────┬─────────┘
//!                             │ one instance per resource
//!                ┌────────────┼────────────┐
//!        ┌───────▼───────┐    │    ┌───────▼───────┐
//!        │   Probe-1     │    │    │   Probe-N     │
//!        │ (check+ring)  │    │    │ (check+ring)  │
//!        └───────┬───────┘    │    └───────┬───────┘
//!                │ LevelChanged events     │
//!                └────────────┬────────────┘
//!                   ┌─────────▼──────────┐
//!                   │ Broadcast Channel  │ (per probe)
//!                   └────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! Probes are created lazily on the first observer attach and never
//! destroyed while the process runs. The schedule is live while at least
//! one observer is attached; detaching the last observer idles the probe
//! but keeps its history and published level.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each probe has an mpsc command channel (attach, detach,
//!    queries, run-now, shutdown) with oneshot responders
//! 2. **Events**: level transitions are published to a broadcast channel
//!    for fan-out to the node tree and tests

pub mod cache;
pub mod messages;
pub mod runner;

pub use cache::{CacheError, ProbeCache};
pub use messages::{ProbeCommand, ProbeEvent};
pub use runner::ProbeHandle;
