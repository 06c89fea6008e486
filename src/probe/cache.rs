//! ProbeCache - one probe instance per monitored resource
//!
//! Multiple parts of the node tree may watch the same resource; they all
//! share one probe, one check execution and one history. The first caller's
//! construction arguments win. A key collision with a different logical
//! resource identity is a configuration defect and fails fast instead of
//! silently handing out the wrong instance.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::{check::CheckSpec, writer::WriterHandle};

use super::runner::ProbeHandle;

/// Errors that can occur while resolving a probe from the cache
#[derive(Debug)]
pub enum CacheError {
    /// Two logically different resources collided on the same cache key
    IdentityConflict {
        key: String,
        cached: String,
        requested: String,
    },

    /// Opening the probe's durable state failed
    Spawn {
        key: String,
        source: anyhow::Error,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::IdentityConflict {
                key,
                cached,
                requested,
            } => write!(
                f,
                "probe cache key {key:?} already bound to identity {cached:?}, requested {requested:?}"
            ),
            CacheError::Spawn { key, source } => {
                write!(f, "failed to spawn probe for {key:?}: {source:#}")
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// Deduplicates probe instances per canonicalized resource path.
pub struct ProbeCache {
    state_dir: PathBuf,
    writer: WriterHandle,
    probes: Mutex<HashMap<String, ProbeHandle>>,
}

impl ProbeCache {
    pub fn new(state_dir: impl Into<PathBuf>, writer: WriterHandle) -> Self {
        Self {
            state_dir: state_dir.into(),
            writer,
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Look up or lazily create the probe for `key`.
    ///
    /// On a hit, `spec` is discarded after its identity is verified against
    /// the cached instance.
    pub fn get_or_create(&self, key: &str, spec: CheckSpec) -> Result<ProbeHandle, CacheError> {
        let key = canonicalize_key(key);

        let mut probes = self.probes.lock().unwrap();

        if let Some(existing) = probes.get(&key) {
            if existing.identity() != spec.identity {
                return Err(CacheError::IdentityConflict {
                    key,
                    cached: existing.identity().to_string(),
                    requested: spec.identity,
                });
            }
            trace!("probe cache hit for {key}");
            return Ok(existing.clone());
        }

        debug!("creating probe for {key}");
        let handle = ProbeHandle::spawn(&key, spec, &self.state_dir, Some(self.writer.clone()))
            .map_err(|source| CacheError::Spawn {
                key: key.clone(),
                source,
            })?;

        probes.insert(key, handle.clone());
        Ok(handle)
    }

    /// Probe already cached for `key`, if any.
    pub fn get(&self, key: &str) -> Option<ProbeHandle> {
        let key = canonicalize_key(key);
        self.probes.lock().unwrap().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.lock().unwrap().is_empty()
    }
}

/// Normalize a resource path into a stable cache key.
fn canonicalize_key(key: &str) -> String {
    let mut canonical = String::with_capacity(key.len());
    let mut last_was_slash = false;

    for c in key.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if !last_was_slash && !canonical.is_empty() {
                canonical.push('/');
            }
            last_was_slash = true;
        } else {
            canonical.push(c);
            last_was_slash = false;
        }
    }

    while canonical.ends_with('/') {
        canonical.pop();
    }

    canonical
}
