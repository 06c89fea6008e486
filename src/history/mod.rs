//! Durable bounded history per probe
//!
//! Every probe owns one history ring: a newest-first, fixed-capacity
//! sequence of [`crate::ProbeResult`] that survives process restart.
//!
//! ## Design
//!
//! - **Append-biased**: one framed record appended and flushed per run
//! - **Crash-safe**: a torn final record is truncated on reopen; committed
//!   entries are never lost
//! - **Versioned**: file and record version tags keep old on-disk data
//!   readable; unknown versions fail the open loudly
//! - **Bounded**: eviction happens with the append; the log is compacted
//!   once it reaches twice the ring capacity

pub mod error;
pub mod record;
pub mod store;

pub use error::{HistoryError, HistoryResult};
pub use store::HistoryStore;
