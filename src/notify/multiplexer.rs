//! Debounced per-observer notification batching.
//!
//! Three event classes are batched independently per observer: node added,
//! node removed, and alert level changed. One generic delivery pump serves
//! all three, parameterized by the batch's merge behavior (counter
//! increment vs list append). An event arriving for an idle slot starts a
//! pump and rides in its first payload; an event arriving while a delivery
//! is in flight merges into the pending batch without starting a second
//! task. The pump loops snapshot-and-clear → deliver → debounce sleep and
//! deregisters itself on an empty drain, so an observer sees at most one
//! message per class per debounce window and no event is ever dropped. An
//! unreachable observer is pruned entirely instead of retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::LevelChange;

use super::observer::{Observer, ObserverId};

/// Fixed debounce window between deliveries to one observer.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(250);

/// Accumulating payload for one event class.
trait Batch: Default + Send + 'static {
    type Event: Send;

    fn merge(&mut self, event: Self::Event);
    fn is_empty(&self) -> bool;
}

/// Structural changes collapse into a count.
#[derive(Default)]
struct CountBatch(usize);

impl Batch for CountBatch {
    type Event = ();

    fn merge(&mut self, _event: ()) {
        self.0 += 1;
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Level transitions accumulate as an ordered list.
#[derive(Default)]
struct ChangeBatch(Vec<LevelChange>);

impl Batch for ChangeBatch {
    type Event = LevelChange;

    fn merge(&mut self, event: LevelChange) {
        self.0.push(event);
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct SlotState<B> {
    batch: B,
    in_flight: bool,
}

/// Pending payload + pump flag for one (observer, class) pair.
struct BatchSlot<B> {
    state: Mutex<SlotState<B>>,
}

impl<B: Batch> BatchSlot<B> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                batch: B::default(),
                in_flight: false,
            }),
        }
    }
}

#[derive(Clone)]
struct ObserverEntry {
    observer: Arc<dyn Observer>,
    added: Arc<BatchSlot<CountBatch>>,
    removed: Arc<BatchSlot<CountBatch>>,
    changed: Arc<BatchSlot<ChangeBatch>>,
}

struct MuxInner {
    debounce: Duration,
    registry: Mutex<HashMap<ObserverId, ObserverEntry>>,
}

impl MuxInner {
    fn drop_observer(&self, id: &str) {
        if self.registry.lock().unwrap().remove(id).is_some() {
            debug!("removed observer {id}");
        }
    }
}

/// Batches and debounces change notifications per registered observer.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<MuxInner>,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new(DEBOUNCE_INTERVAL)
    }
}

impl Multiplexer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                debounce,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn register(&self, id: impl Into<ObserverId>, observer: Arc<dyn Observer>) {
        let id = id.into();
        debug!("registering observer {id}");
        self.inner.registry.lock().unwrap().insert(
            id,
            ObserverEntry {
                observer,
                added: Arc::new(BatchSlot::new()),
                removed: Arc::new(BatchSlot::new()),
                changed: Arc::new(BatchSlot::new()),
            },
        );
    }

    pub fn unregister(&self, id: &str) {
        self.inner.drop_observer(id);
    }

    pub fn observer_count(&self) -> usize {
        self.inner.registry.lock().unwrap().len()
    }

    /// Queue a node-added notification for one observer.
    pub fn node_added(&self, id: &str) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let observer = entry.observer.clone();
        self.signal(id, entry.added.clone(), (), move |batch: CountBatch| {
            let observer = observer.clone();
            async move { observer.on_nodes_added(batch.0).await }
        });
    }

    /// Queue a node-removed notification for one observer.
    pub fn node_removed(&self, id: &str) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let observer = entry.observer.clone();
        self.signal(id, entry.removed.clone(), (), move |batch: CountBatch| {
            let observer = observer.clone();
            async move { observer.on_nodes_removed(batch.0).await }
        });
    }

    /// Queue a level-change notification for one observer.
    pub fn level_changed(&self, id: &str, change: LevelChange) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let observer = entry.observer.clone();
        self.signal(id, entry.changed.clone(), change, move |batch: ChangeBatch| {
            let observer = observer.clone();
            async move { observer.on_levels_changed(batch.0).await }
        });
    }

    /// Fan a node-added event out to every registered observer.
    pub fn broadcast_node_added(&self) {
        for id in self.observer_ids() {
            self.node_added(&id);
        }
    }

    /// Fan a node-removed event out to every registered observer.
    pub fn broadcast_node_removed(&self) {
        for id in self.observer_ids() {
            self.node_removed(&id);
        }
    }

    /// Fan a level change out to every registered observer.
    pub fn broadcast_level_changed(&self, change: &LevelChange) {
        for id in self.observer_ids() {
            self.level_changed(&id, change.clone());
        }
    }

    fn observer_ids(&self) -> Vec<ObserverId> {
        self.inner.registry.lock().unwrap().keys().cloned().collect()
    }

    fn entry(&self, id: &str) -> Option<ObserverEntry> {
        self.inner.registry.lock().unwrap().get(id).cloned()
    }

    /// Merge an event into a slot, starting the pump if none is in flight.
    fn signal<B, F, Fut>(&self, id: &str, slot: Arc<BatchSlot<B>>, event: B::Event, deliver: F)
    where
        B: Batch,
        F: Fn(B) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let start = {
            let mut state = slot.state.lock().unwrap();
            state.batch.merge(event);
            if state.in_flight {
                trace!("merged event into in-flight batch for {id}");
                false
            } else {
                state.in_flight = true;
                true
            }
        };

        if start {
            spawn_pump(self.inner.clone(), id.to_string(), slot, deliver);
        }
    }
}

/// The delivery pump for one (observer, class) pair.
fn spawn_pump<B, F, Fut>(inner: Arc<MuxInner>, id: ObserverId, slot: Arc<BatchSlot<B>>, deliver: F)
where
    B: Batch,
    F: Fn(B) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let batch = {
                let mut state = slot.state.lock().unwrap();
                if state.batch.is_empty() {
                    state.in_flight = false;
                    return;
                }
                std::mem::take(&mut state.batch)
            };

            if let Err(e) = deliver(batch).await {
                warn!("observer {id} unreachable, pruning: {e:#}");
                inner.drop_observer(&id);

                let mut state = slot.state.lock().unwrap();
                state.batch = B::default();
                state.in_flight = false;
                return;
            }

            tokio::time::sleep(inner.debounce).await;
        }
    });
}
