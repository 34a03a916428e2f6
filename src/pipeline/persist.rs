//! Persist store backed by `sled`
//!
//! Holds state that should survive a pipeline restart, keyed by the
//! component's persist name (for example `zmq_source:localhost:5558`).
//! Values are JSON so the store stays readable with any sled tooling.
//!
//! Opening with `keep = false` discards whatever a previous run left behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sled::Db;
use tracing::{debug, info};

use crate::utils::error::PipelineError;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceState {
    /// Lines received over every run that kept its persist state.
    pub received: u64,
    /// Milliseconds since the UNIX epoch of the last received line.
    pub last_received_at: Option<i64>,
}

#[derive(Clone)]
pub struct PersistStore {
    db: Db,
    path: Option<PathBuf>,
}

impl PersistStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>, keep: bool) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !keep && path.exists() {
            info!(path = %path.display(), "discarding previous persist state");
            std::fs::remove_dir_all(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        debug!(path = %path.display(), recovered = db.was_recovered(), "persist store opened");
        Ok(Self {
            db,
            path: Some(path.to_path_buf()),
        })
    }

    /// A store that lives only as long as this handle.
    pub fn temporary() -> Result<Self, PipelineError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load_source_state(&self, persist_name: &str) -> Result<SourceState, PipelineError> {
        match self.db.get(persist_name)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(SourceState::default()),
        }
    }

    pub fn save_source_state(
        &self,
        persist_name: &str,
        state: &SourceState,
    ) -> Result<(), PipelineError> {
        let serialized = serde_json::to_vec(state)?;
        self.db.insert(persist_name, serialized)?;
        Ok(())
    }

    /// Persist names currently holding state, in key order.
    pub fn names(&self) -> Vec<String> {
        self.db
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .filter_map(|key| String::from_utf8(key.to_vec()).ok())
            .collect()
    }

    pub fn flush(&self) -> Result<(), PipelineError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for PersistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistStore")
            .field("db", &"sled::Db")
            .field("path", &self.path)
            .finish()
    }
}
