//! Coalescing background writer for whole-file state.
//!
//! Durable-state mutations enqueue `(final path, staging path, payload)`
//! entries; a single background worker drains the queue and commits each
//! entry by writing the staging file and atomically renaming it over the
//! final path. A newer entry for an already-queued final path replaces the
//! queued payload **in place**: under sustained write pressure only the
//! newest version of each file is ever written, and queue position is kept
//! so distinct files get round-robin service instead of starving behind one
//! hot file. The worker is respawned lazily when the queue goes from empty
//! to non-empty and exits once drained.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::{debug, error, trace};

/// One queued whole-file write, keyed by `final_path`.
#[derive(Debug, Clone)]
struct PendingWrite {
    final_path: PathBuf,
    staging_path: PathBuf,
    payload: Vec<u8>,
}

#[derive(Default)]
struct WriterState {
    queue: VecDeque<PendingWrite>,
    worker_running: bool,
}

struct WriterInner {
    state: Mutex<WriterState>,
    drained: Notify,
}

/// Handle for enqueueing coalesced background writes.
#[derive(Clone)]
pub struct WriterHandle {
    inner: Arc<WriterInner>,
}

impl Default for WriterHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WriterInner {
                state: Mutex::new(WriterState::default()),
                drained: Notify::new(),
            }),
        }
    }

    /// Queue a whole-file write. Fire-and-forget: failures are logged by
    /// the worker and the entry is dropped (the next state change enqueues
    /// a fresh copy anyway).
    pub fn enqueue(
        &self,
        final_path: impl Into<PathBuf>,
        staging_path: impl Into<PathBuf>,
        payload: Vec<u8>,
    ) {
        let final_path = final_path.into();
        let staging_path = staging_path.into();

        let start_worker = {
            let mut state = self.inner.state.lock().unwrap();

            match state
                .queue
                .iter_mut()
                .find(|entry| entry.final_path == final_path)
            {
                Some(entry) => {
                    trace!("coalescing queued write for {}", final_path.display());
                    entry.staging_path = staging_path;
                    entry.payload = payload;
                }
                None => {
                    state.queue.push_back(PendingWrite {
                        final_path,
                        staging_path,
                        payload,
                    });
                }
            }

            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };

        if start_worker {
            let inner = self.inner.clone();
            tokio::spawn(drain(inner));
        }
    }

    /// Wait until every queued entry has been committed (or dropped).
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register for the wakeup before checking, so a drain finishing
            // in between cannot be missed.
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock().unwrap();
                if state.queue.is_empty() && !state.worker_running {
                    return;
                }
            }

            notified.await;
        }
    }

    #[cfg(test)]
    fn queued(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let state = self.inner.state.lock().unwrap();
        state
            .queue
            .iter()
            .map(|entry| (entry.final_path.clone(), entry.payload.clone()))
            .collect()
    }
}

/// Worker loop: pop-front under the lock, write outside it.
async fn drain(inner: Arc<WriterInner>) {
    debug!("write worker started");

    loop {
        let entry = {
            let mut state = inner.state.lock().unwrap();
            match state.queue.pop_front() {
                Some(entry) => entry,
                None => {
                    state.worker_running = false;
                    drop(state);
                    inner.drained.notify_waiters();
                    debug!("write worker drained, exiting");
                    return;
                }
            }
        };

        if let Err(e) = commit(&entry).await {
            error!(
                "failed to persist {}: {:#}",
                entry.final_path.display(),
                e
            );
        }
    }
}

/// Write the staging file, flush it, and atomically replace the final path.
async fn commit(entry: &PendingWrite) -> anyhow::Result<()> {
    if let Some(parent) = entry.final_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("failed to create state directory")?;
    }

    let mut file = tokio::fs::File::create(&entry.staging_path)
        .await
        .context("failed to create staging file")?;
    file.write_all(&entry.payload)
        .await
        .context("failed to write staging file")?;
    file.sync_all()
        .await
        .context("failed to flush staging file")?;
    drop(file);

    match tokio::fs::rename(&entry.staging_path, &entry.final_path).await {
        Ok(()) => Ok(()),
        Err(rename_err) => replace_via_delete(entry, rename_err).await,
    }
}

/// Fallback for platforms without rename-over-existing. A failed delete is
/// fatal for this entry: reported, not retried.
async fn replace_via_delete(entry: &PendingWrite, rename_err: std::io::Error) -> anyhow::Result<()> {
    match tokio::fs::remove_file(&entry.final_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            anyhow::bail!(
                "cannot replace {}: rename failed ({rename_err}) and delete failed ({e})",
                entry.final_path.display()
            );
        }
    }

    tokio::fs::rename(&entry.staging_path, &entry.final_path)
        .await
        .with_context(|| {
            format!(
                "rename after delete failed for {}",
                entry.final_path.display()
            )
        })
}

/// Staging-pair convention for whole-file state: `<name>` / `<name>.new`.
pub fn staging_pair(final_path: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let final_path = final_path.as_ref().to_path_buf();
    let mut os = final_path.as_os_str().to_os_string();
    os.push(".new");
    (final_path, PathBuf::from(os))
}
