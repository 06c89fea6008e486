//! Node tree - the consumer of the probe engine
//!
//! A path-keyed hierarchy whose leaves wrap probes and whose interior
//! nodes carry the maximum alert level of their children (`Unknown` wins).
//! The tree attaches to probes through the cache, forwards their level
//! transitions upward and hands every visible change to the notification
//! multiplexer. It is the only caller of the engine components.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::{
    LevelChange,
    check::CheckSpec,
    level::AlertLevel,
    notify::Multiplexer,
    probe::{CacheError, ProbeCache, ProbeEvent, ProbeHandle},
};

enum NodeKind {
    Interior,
    Leaf {
        probe: ProbeHandle,
        forwarder: tokio::task::JoinHandle<()>,
    },
}

struct NodeState {
    level: AlertLevel,
    kind: NodeKind,
}

struct TreeInner {
    cache: Arc<ProbeCache>,
    mux: Multiplexer,
    nodes: Mutex<HashMap<String, NodeState>>,
}

impl TreeInner {
    /// Set a node's level and recompute every ancestor, collecting the
    /// visible transitions. Runs entirely under the map lock.
    fn set_level_and_propagate(
        &self,
        path: &str,
        new: AlertLevel,
        message: &str,
    ) -> Vec<LevelChange> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut changes = Vec::new();

        match nodes.get_mut(path) {
            Some(node) => {
                if node.level != new {
                    changes.push(LevelChange {
                        path: path.to_string(),
                        old: node.level,
                        new,
                        message: message.to_string(),
                    });
                    node.level = new;
                }
            }
            None => {
                trace!("level change for unknown node {path}, ignoring");
                return changes;
            }
        }

        let mut cursor = path.to_string();
        while let Some((parent, _)) = cursor.rsplit_once('/') {
            let aggregated = max_child_level(&nodes, parent);
            if let Some(node) = nodes.get_mut(parent)
                && node.level != aggregated
            {
                changes.push(LevelChange {
                    path: parent.to_string(),
                    old: node.level,
                    new: aggregated,
                    message: message.to_string(),
                });
                node.level = aggregated;
            }
            cursor = parent.to_string();
        }

        changes
    }

    fn publish(&self, changes: Vec<LevelChange>) {
        for change in changes {
            debug!(
                "node {} changed: {} -> {}",
                change.path, change.old, change.new
            );
            self.mux.broadcast_level_changed(&change);
        }
    }
}

/// Maximum level over the direct children of `parent`; `Unknown` when
/// there are none.
fn max_child_level(nodes: &HashMap<String, NodeState>, parent: &str) -> AlertLevel {
    nodes
        .iter()
        .filter(|(path, _)| is_direct_child(parent, path))
        .map(|(_, node)| node.level)
        .max()
        .unwrap_or(AlertLevel::Unknown)
}

fn is_direct_child(parent: &str, path: &str) -> bool {
    path.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Hierarchy of monitored resources, aggregating alert levels upward.
#[derive(Clone)]
pub struct NodeTree {
    inner: Arc<TreeInner>,
}

impl NodeTree {
    pub fn new(cache: Arc<ProbeCache>, mux: Multiplexer) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                cache,
                mux,
                nodes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Mount a probe-backed leaf at `path`, creating interior nodes for
    /// every missing path segment. Attaches to the (possibly shared) probe,
    /// so the probe schedule starts with the first leaf that wraps it.
    pub async fn add_leaf(&self, path: &str, spec: CheckSpec) -> Result<ProbeHandle, CacheError> {
        let probe = self.inner.cache.get_or_create(path, spec)?;
        let path = probe.path().to_string();

        if let Err(e) = probe.attach().await {
            warn!("failed to attach to probe {path}: {e:#}");
        }

        let level = probe.current_level().await.unwrap_or_default();

        let added = {
            let mut nodes = self.inner.nodes.lock().unwrap();
            let mut added = 0;

            for ancestor in ancestors(&path) {
                nodes.entry(ancestor).or_insert_with(|| {
                    added += 1;
                    NodeState {
                        level: AlertLevel::Unknown,
                        kind: NodeKind::Interior,
                    }
                });
            }

            match nodes.entry(path.clone()) {
                std::collections::hash_map::Entry::Occupied(_) => {
                    // Re-adding an existing leaf only bumps the attach count.
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    added += 1;
                    let forwarder = spawn_forwarder(self.inner.clone(), probe.subscribe());
                    slot.insert(NodeState {
                        level,
                        kind: NodeKind::Leaf {
                            probe: probe.clone(),
                            forwarder,
                        },
                    });
                }
            }

            added
        };

        for _ in 0..added {
            self.inner.mux.broadcast_node_added();
        }

        // A resumed probe may come back with a non-default level.
        let changes = self.inner.set_level_and_propagate(&path, level, "");
        self.inner.publish(changes);

        Ok(probe)
    }

    /// Unmount the leaf at `path`: detach from its probe (the probe idles
    /// once its last observer is gone, keeping its history), prune interior
    /// nodes left childless, and notify observers.
    pub async fn remove_leaf(&self, path: &str) {
        let (probe, removed, changes) = {
            let mut nodes = self.inner.nodes.lock().unwrap();

            // Only leaves are removable through this call.
            match nodes.get(path) {
                Some(state) if matches!(state.kind, NodeKind::Leaf { .. }) => {}
                _ => return,
            }

            let Some(node) = nodes.remove(path) else {
                return;
            };
            let NodeKind::Leaf { probe, forwarder } = node.kind else {
                return;
            };
            forwarder.abort();

            let mut removed = 1usize;
            let mut changes = Vec::new();
            let mut cursor = path.to_string();
            while let Some((parent, _)) = cursor.rsplit_once('/') {
                let childless = !nodes.keys().any(|p| is_direct_child(parent, p));
                let interior = matches!(
                    nodes.get(parent).map(|n| &n.kind),
                    Some(NodeKind::Interior)
                );

                if childless && interior {
                    nodes.remove(parent);
                    removed += 1;
                } else if let Some(state) = nodes.get(parent) {
                    // A surviving ancestor may drop now that the leaf is gone.
                    let aggregated = max_child_level(&nodes, parent);
                    if state.level != aggregated {
                        changes.push(LevelChange {
                            path: parent.to_string(),
                            old: state.level,
                            new: aggregated,
                            message: String::new(),
                        });
                        if let Some(state) = nodes.get_mut(parent) {
                            state.level = aggregated;
                        }
                    }
                }

                cursor = parent.to_string();
            }

            (probe, removed, changes)
        };

        if let Err(e) = probe.detach().await {
            warn!("failed to detach from probe {path}: {e:#}");
        }

        for _ in 0..removed {
            self.inner.mux.broadcast_node_removed();
        }
        self.inner.publish(changes);

        debug!("removed {removed} node(s) under {path}");
    }

    /// Level of any node, leaf or interior.
    pub fn level_of(&self, path: &str) -> Option<AlertLevel> {
        self.inner.nodes.lock().unwrap().get(path).map(|n| n.level)
    }

    /// Most severe level across the whole tree.
    pub fn overall_level(&self) -> AlertLevel {
        self.inner
            .nodes
            .lock()
            .unwrap()
            .values()
            .map(|n| n.level)
            .max()
            .unwrap_or(AlertLevel::Unknown)
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.lock().unwrap().len()
    }
}

/// Forward one probe's level transitions into the tree.
fn spawn_forwarder(
    inner: Arc<TreeInner>,
    mut rx: tokio::sync::broadcast::Receiver<ProbeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ProbeEvent::LevelChanged {
                    path,
                    new,
                    message,
                    ..
                }) => {
                    let changes = inner.set_level_and_propagate(&path, new, &message);
                    inner.publish(changes);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("tree forwarder lagged, skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    trace!("probe event channel closed");
                    break;
                }
            }
        }
    })
}

/// Interior paths above `path`, shortest first.
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut acc = String::new();
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        out.push(acc.clone());
    }
    out
}
