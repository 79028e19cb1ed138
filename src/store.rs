//! Durable session record.
//!
//! The file store keeps `{"username": ..., "fullname": ...}` in
//! `<config_dir>/srot/session.json`. A missing file, unreadable JSON, or an empty
//! `username` all mean "no active session".

use crate::Session;
use crate::config::{self, atomic_write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session directory not found")]
    NoDataDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted (user id, display name) pair. Writes replace or remove the whole record.
pub trait SessionStore {
    fn load(&self) -> Option<Session>;
    fn save(&self, session: &Session) -> Result<(), StoreError>;
    /// Remove the record. A no-op when nothing is stored.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn load(&self) -> Option<Session> {
        (**self).load()
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        (**self).save(session)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store at the platform default location.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = config::config_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::at(dir.join("session.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<Session> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read session {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Session>(&contents) {
            Ok(session) if !session.user_id.is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring corrupt session {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        atomic_write(&self.path, json.as_bytes())?;
        debug!(user_id = %session.user_id, path = %self.path.display(), "session saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<Session> {
        self.slot().clone()
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
