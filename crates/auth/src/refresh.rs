//! Credential refresh: one request/response exchange, no internal retry.
//!
//! [`CredentialRefresher::refresh`] is the only place the session credential is
//! replaced after login. Its side effects are part of the contract:
//!
//! - success: the new credential is installed in the [`Session`] and persisted
//! - rejection: the persisted credential is cleared; the caller forces logout
//! - transient failure (timeout, network, 5xx): nothing is cleared and the
//!   caller may try again later

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use myduka_core::ApiError;
use myduka_core::error::ErrorBody;

use crate::{Role, Session, SessionCredential};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no credential to refresh")]
    NoCredential,

    #[error("credential refresh timed out after {0:?}")]
    Timeout(Duration),

    #[error("credential refresh failed: {0}")]
    Api(#[from] ApiError),
}

impl RefreshError {
    /// Whether a later attempt may succeed with the same refresh capability.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Api(err) => err.is_transient(),
            Self::NoCredential => false,
        }
    }
}

/// The network half of a refresh: trade the current credential for a new one.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, current: &SessionCredential) -> Result<SessionCredential, RefreshError>;
}

/// Refreshes the session credential with bounded time and session side effects.
pub struct CredentialRefresher {
    exchange: Arc<dyn TokenExchange>,
    session: Arc<Session>,
    timeout: Duration,
}

impl CredentialRefresher {
    pub fn new(exchange: Arc<dyn TokenExchange>, session: Arc<Session>, timeout: Duration) -> Self {
        Self {
            exchange,
            session,
            timeout,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn refresh(&self) -> Result<SessionCredential, RefreshError> {
        let result = self.attempt().await;
        match &result {
            Ok(fresh) => {
                if let Err(err) = self.session.replace_credential(fresh.clone()) {
                    // The refreshed credential still works for this run.
                    tracing::warn!("refreshed credential could not be persisted: {err}");
                }
                tracing::info!(role = %fresh.role(), "credential refreshed");
            }
            Err(err) if err.is_transient() => {
                tracing::warn!("credential refresh did not complete: {err}");
            }
            Err(err) => {
                tracing::warn!("credential refresh rejected: {err}");
                self.session.clear_persisted();
            }
        }
        result
    }

    async fn attempt(&self) -> Result<SessionCredential, RefreshError> {
        let current = self.session.credential().ok_or(RefreshError::NoCredential)?;
        match tokio::time::timeout(self.timeout, self.exchange.exchange(&current)).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(self.timeout)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    role: Option<Role>,
}

/// `POST {api}/auth/refresh` with the refresh capability as bearer token.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpTokenExchange {
    pub fn new(api_base: &url::Url, request_timeout: Duration) -> Result<Self, ApiError> {
        let endpoint = api_base
            .join("auth/refresh")
            .map_err(|e| ApiError::decode(format!("invalid refresh url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, current: &SessionCredential) -> Result<SessionCredential, RefreshError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(current.refresh_capability())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body, None).into());
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::decode(format!("invalid refresh response: {e}")))?;

        let mut fresh = SessionCredential::new(body.access_token, body.role.unwrap_or(current.role()));
        if let Some(refresh_token) = body.refresh_token.or_else(|| current.refresh_token().map(str::to_string)) {
            fresh = fresh.with_refresh_token(refresh_token);
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CredentialStore, InMemoryCredentialStore, PersistedSession};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedExchange {
        outcome: Result<&'static str, ApiError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn exchange(&self, current: &SessionCredential) -> Result<SessionCredential, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.outcome {
                Ok(token) => Ok(SessionCredential::new(*token, current.role())),
                Err(e) => Err(e.clone().into()),
            }
        }
    }

    fn session_with(token: &str) -> (Arc<dyn CredentialStore>, Arc<Session>) {
        let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::with_session(PersistedSession {
            credential: SessionCredential::new(token, Role::Merchant),
            profile: None,
        }));
        let session = Arc::new(Session::restore(Arc::clone(&store)).unwrap());
        (store, session)
    }

    #[tokio::test]
    async fn success_installs_and_persists_new_credential() {
        let (store, session) = session_with("old");
        let exchange = Arc::new(ScriptedExchange {
            outcome: Ok("new"),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let refresher = CredentialRefresher::new(exchange.clone(), Arc::clone(&session), Duration::from_secs(1));

        let fresh = refresher.refresh().await.unwrap();

        assert_eq!(fresh.access_token(), "new");
        assert_eq!(session.credential().unwrap().access_token(), "new");
        assert_eq!(store.load().unwrap().unwrap().credential.access_token(), "new");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_clears_persisted_credential_without_retrying() {
        let (store, session) = session_with("old");
        let exchange = Arc::new(ScriptedExchange {
            outcome: Err(ApiError::Unauthorized {
                status: 401,
                message: "expired".to_string(),
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let refresher = CredentialRefresher::new(exchange.clone(), session, Duration::from_secs(1));

        let err = refresher.refresh().await.unwrap_err();

        assert!(matches!(err, RefreshError::Api(ApiError::Unauthorized { .. })));
        assert!(store.load().unwrap().is_none());
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_exchange_times_out() {
        let (store, session) = session_with("old");
        let exchange = Arc::new(ScriptedExchange {
            outcome: Ok("never"),
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let refresher = CredentialRefresher::new(exchange, session, Duration::from_secs(5));

        let err = refresher.refresh().await.unwrap_err();

        assert_eq!(err, RefreshError::Timeout(Duration::from_secs(5)));
        assert!(err.is_transient());
        assert_eq!(store.load().unwrap().unwrap().credential.access_token(), "old");
    }

    #[tokio::test]
    async fn server_outage_keeps_persisted_credential() {
        let (store, session) = session_with("old");
        let exchange = Arc::new(ScriptedExchange {
            outcome: Err(ApiError::Server {
                status: 503,
                message: "maintenance".to_string(),
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let refresher = CredentialRefresher::new(exchange, Arc::clone(&session), Duration::from_secs(1));

        let err = refresher.refresh().await.unwrap_err();

        assert!(err.is_transient());
        assert!(session.is_authenticated());
        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_credential_is_reported() {
        let session = Arc::new(Session::new(Arc::new(InMemoryCredentialStore::new())));
        let exchange = Arc::new(ScriptedExchange {
            outcome: Ok("x"),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let refresher = CredentialRefresher::new(exchange.clone(), session, Duration::from_secs(1));

        assert_eq!(refresher.refresh().await.unwrap_err(), RefreshError::NoCredential);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
    }
}
