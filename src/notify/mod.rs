//! Change notification delivery to remote observers
//!
//! A burst of structural or alert-level changes must reach every attached
//! dashboard without flooding a slow or disconnected one. Each observer
//! gets at most one in-flight delivery task per event class; everything
//! arriving meanwhile merges into the pending batch.

pub mod multiplexer;
pub mod observer;

pub use multiplexer::{DEBOUNCE_INTERVAL, Multiplexer};
pub use observer::{Observer, ObserverId};
