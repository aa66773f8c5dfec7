//! Explicit session context.
//!
//! One `Session` per logged-in user, created at login (or restored at start-up)
//! and passed by `Arc` to the connector, the refresher and the REST client. Its
//! lifecycle is tied to login/logout, never to process start.

use std::sync::{Arc, RwLock};

use crate::store::{CredentialStore, PersistedSession, StoreError};
use crate::{Role, SessionCredential, UserProfile};

pub struct Session {
    store: Arc<dyn CredentialStore>,
    current: RwLock<Option<PersistedSession>>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("role", &self.role())
            .finish()
    }
}

impl Session {
    /// An empty (logged-out) session backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Reload whatever the store persisted in a previous run.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Result<Self, StoreError> {
        let persisted = store.load()?;
        if let Some(p) = &persisted {
            tracing::info!(role = %p.credential.role(), "restored persisted session");
        }
        Ok(Self {
            store,
            current: RwLock::new(persisted),
        })
    }

    /// Install a freshly issued credential, replacing any previous one.
    pub fn login(&self, credential: SessionCredential, profile: Option<UserProfile>) -> Result<(), StoreError> {
        let persisted = PersistedSession { credential, profile };
        self.store.save(&persisted)?;
        tracing::info!(role = %persisted.credential.role(), "session established");
        self.write(Some(persisted));
        Ok(())
    }

    pub fn credential(&self) -> Option<SessionCredential> {
        self.read(|s| s.map(|p| p.credential.clone()))
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read(|s| s.and_then(|p| p.profile.clone()))
    }

    pub fn role(&self) -> Option<Role> {
        self.read(|s| s.map(|p| p.credential.role()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.is_some())
    }

    /// Swap in a refreshed credential, keeping the profile, and persist it.
    ///
    /// The in-memory credential is replaced even if persisting fails; the error is
    /// returned so the caller can log it.
    pub fn replace_credential(&self, credential: SessionCredential) -> Result<(), StoreError> {
        let profile = self.profile();
        let persisted = PersistedSession { credential, profile };
        let saved = self.store.save(&persisted);
        self.write(Some(persisted));
        saved
    }

    /// Drop the persisted copy only (the in-memory credential stays until logout).
    pub fn clear_persisted(&self) {
        if let Err(err) = self.store.clear() {
            tracing::error!("failed to clear persisted session: {err}");
        }
    }

    /// Forget the credential everywhere.
    pub fn logout(&self) {
        self.clear_persisted();
        self.write(None);
        tracing::info!("session cleared");
    }

    fn read<T>(&self, f: impl FnOnce(Option<&PersistedSession>) -> T) -> T {
        match self.current.read() {
            Ok(guard) => f(guard.as_ref()),
            Err(poisoned) => f(poisoned.into_inner().as_ref()),
        }
    }

    fn write(&self, value: Option<PersistedSession>) {
        match self.current.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}
