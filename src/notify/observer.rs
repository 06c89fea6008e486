//! Observer contract for remote dashboards.

use async_trait::async_trait;

use crate::LevelChange;

/// Identifier for a registered observer.
pub type ObserverId = String;

/// A remote party interested in tree changes.
///
/// Deliveries arrive pre-batched through the multiplexer: structural
/// changes as counts, level transitions as the accumulated list. Observers
/// may disconnect at any time; a returned error deregisters the observer
/// (it is not escalated as an alert).
#[async_trait]
pub trait Observer: Send + Sync {
    /// Nodes appeared since the last delivery.
    async fn on_nodes_added(&self, count: usize) -> anyhow::Result<()>;

    /// Nodes disappeared since the last delivery.
    async fn on_nodes_removed(&self, count: usize) -> anyhow::Result<()>;

    /// Alert-level transitions since the last delivery, oldest first.
    async fn on_levels_changed(&self, changes: Vec<LevelChange>) -> anyhow::Result<()>;
}
