//! Client-local persistence of the session (credential + profile).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SessionCredential, UserProfile};

/// What survives a restart of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub credential: SessionCredential,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt session file: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("could not resolve a data directory for the session file")]
    NoDataDir,
}

/// Storage backend for the persisted session.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError>;
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError>;
    /// Remove any persisted session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file store (`<data_dir>/myduka/session.json` by default).
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the OS data directory.
    pub fn default_location() -> Result<Self, StoreError> {
        Ok(Self::new(session_file_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_err(err)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(session)?;

        // Write-then-rename so a crash never leaves a half-written file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: Mutex<Option<PersistedSession>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        Ok(self.inner.lock().map(|g| g.clone()).unwrap_or(None))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(session.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
        Ok(())
    }
}

/// Resolve `<data_dir>/myduka/session.json`.
fn session_file_path() -> Result<PathBuf, StoreError> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .ok_or(StoreError::NoDataDir)?;

    let mut path = base;
    path.push("myduka");
    path.push("session.json");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn temp_store(name: &str) -> FileCredentialStore {
        let mut path = std::env::temp_dir();
        path.push(format!("myduka-store-{}-{}", name, std::process::id()));
        path.push("session.json");
        FileCredentialStore::new(path)
    }

    fn persisted(token: &str) -> PersistedSession {
        PersistedSession {
            credential: SessionCredential::new(token, Role::Admin),
            profile: None,
        }
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let store = temp_store("roundtrip");
        assert!(store.load().unwrap().is_none());

        store.save(&persisted("t1")).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.credential.access_token(), "t1");

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
        store.clear().unwrap();
    }

    #[test]
    fn in_memory_store_behaves_like_file_store() {
        let store = InMemoryCredentialStore::new();
        store.save(&persisted("t2")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().credential.access_token(), "t2");
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
