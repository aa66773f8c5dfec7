//! Session-wide live connection manager.
//!
//! A [`Connector`] owns at most one live connection. All connection work runs
//! on a single driver task per `open`:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONNECTED -> (ERROR | DISCONNECTED_BY_SERVER)
//!     -> RECONNECTING -> CONNECTING -> ... -> CONNECTED | FAILED
//! ```
//!
//! - Transient failures (network, timeout, server drop) are retried on the
//!   [`ReconnectPolicy`] schedule; exhausting it ends in `FAILED`.
//! - An authentication failure triggers one credential refresh. Success
//!   reconnects with the new credential after one policy delay. A rejected
//!   refresh, or a second auth failure before the refreshed connection
//!   delivered anything, ends in `FAILED` and emits [`SessionSignal::Invalid`]
//!   once. A refresh that times out or hits a network/server error is a
//!   transient failure and follows the reconnect schedule.
//! - `close()` always ends in `DISCONNECTED` and never reconnects.
//!
//! Inbound events are dispatched on the driver task, in delivery order.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;

use myduka_auth::{CredentialRefresher, RefreshError, SessionCredential};
use myduka_events::EventRouter;

use crate::policy::ReconnectPolicy;
use crate::transport::{Connection, Transport, TransportError};

/// Upper bound on how long `close()` waits for the driver to wind down.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt or the open connection failed on the client side.
    Error,
    DisconnectedByServer,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Terminal until the next `open`.
    Failed,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        self == Self::Connected
    }
}

/// Session-level outcomes the owner of the connector must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The credential could not be renewed; log the user out.
    Invalid { reason: String },
    /// Reconnect attempts are exhausted; the session itself is still valid.
    GaveUp { attempts: u32 },
}

struct Outbound {
    event: String,
    payload: Value,
}

struct Shared {
    transport: Arc<dyn Transport>,
    refresher: Arc<CredentialRefresher>,
    router: EventRouter,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    signals: mpsc::UnboundedSender<SessionSignal>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "live connection state changed");
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

struct Driver {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

pub struct Connector {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl core::fmt::Debug for Connector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connector")
            .field("state", &self.shared.state())
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl Connector {
    /// Build a connector. The returned receiver yields [`SessionSignal`]s.
    pub fn new(
        transport: Arc<dyn Transport>,
        refresher: Arc<CredentialRefresher>,
        router: EventRouter,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionSignal>) {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            transport,
            refresher,
            router,
            policy,
            connect_timeout,
            state,
            signals,
        });
        (
            Self {
                shared,
                driver: Mutex::new(None),
            },
            signal_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn router(&self) -> &EventRouter {
        &self.shared.router
    }

    /// Start connecting with `credential`, closing any existing connection first.
    ///
    /// Returns once the driver is running; observe progress via [`watch_state`](Self::watch_state).
    pub async fn open(&self, credential: SessionCredential) {
        let mut slot = self.driver.lock().await;
        if let Some(previous) = slot.take() {
            stop_driver(previous).await;
        }

        self.shared.set_state(ConnectionState::Connecting);

        let shutdown = Arc::new(Notify::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drive(
            Arc::clone(&self.shared),
            credential,
            Arc::clone(&shutdown),
            outbound_rx,
        ));
        *slot = Some(Driver {
            handle,
            shutdown,
            outbound,
        });
    }

    /// Manual reconnect with the session's current credential.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        let credential = self
            .shared
            .refresher
            .session()
            .credential()
            .ok_or_else(|| TransportError::Unauthorized("no session credential".to_string()))?;
        tracing::info!("manual reconnect requested");
        self.open(credential).await;
        Ok(())
    }

    /// Release the connection. Idempotent; always ends in `DISCONNECTED`.
    pub async fn close(&self) {
        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            stop_driver(driver).await;
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Send a named event over the open connection.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        if !self.state().is_live() {
            return Err(TransportError::Closed);
        }
        let slot = self.driver.lock().await;
        let driver = slot.as_ref().ok_or(TransportError::Closed)?;
        driver
            .outbound
            .send(Outbound {
                event: event.to_string(),
                payload,
            })
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.shutdown.notify_one();
            driver.handle.abort();
        }
    }
}

async fn stop_driver(driver: Driver) {
    let Driver {
        mut handle, shutdown, ..
    } = driver;
    shutdown.notify_one();
    if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
        tracing::warn!("live connection driver did not stop in time; aborting");
        handle.abort();
    }
}

enum Attempt {
    Shutdown,
    Opened(Box<dyn Connection>),
    Failed(TransportError),
}

/// How an established connection ended.
enum Ended {
    Shutdown,
    Failed {
        error: TransportError,
        delivered: bool,
    },
}

async fn drive(
    shared: Arc<Shared>,
    mut credential: SessionCredential,
    shutdown: Arc<Notify>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut attempt: u32 = 0;
    // Set after a refresh; cleared once a connection made with the new
    // credential delivers an event or a non-auth failure intervenes.
    let mut just_refreshed = false;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let failure = match connect(&shared, &credential, &shutdown).await {
            Attempt::Shutdown => return,
            Attempt::Opened(conn) => {
                attempt = 0;
                shared.set_state(ConnectionState::Connected);
                match pump(&shared, conn, &shutdown, &mut outbound).await {
                    Ended::Shutdown => return,
                    Ended::Failed { error, delivered } => {
                        if delivered {
                            just_refreshed = false;
                        }
                        error
                    }
                }
            }
            Attempt::Failed(error) => error,
        };

        let failure = if failure.is_auth_failure() {
            if just_refreshed {
                fail_session(&shared, format!("credential rejected again after refresh: {failure}"));
                return;
            }
            tracing::warn!("live connection rejected the credential; refreshing");
            shared.set_state(ConnectionState::Error);
            let refreshed = tokio::select! {
                _ = shutdown.notified() => return,
                result = shared.refresher.refresh() => result,
            };
            match refreshed {
                Ok(fresh) => {
                    credential = fresh;
                    just_refreshed = true;
                    // The refresh-driven retry does not count against max_attempts.
                    let delay = shared.policy.delay(attempt);
                    tracing::info!(?delay, "reconnecting with refreshed credential");
                    shared.set_state(ConnectionState::Reconnecting);
                    tokio::select! {
                        _ = shutdown.notified() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                Err(err) if err.is_transient() => match err {
                    RefreshError::Timeout(_) => TransportError::Timeout,
                    other => TransportError::Network(other.to_string()),
                },
                Err(err) => {
                    fail_session(&shared, err.to_string());
                    return;
                }
            }
        } else {
            failure
        };

        just_refreshed = false;
        shared.set_state(if failure == TransportError::Closed {
            ConnectionState::DisconnectedByServer
        } else {
            ConnectionState::Error
        });

        if !shared.policy.should_retry(attempt) {
            tracing::error!(attempts = attempt, "giving up on live connection: {failure}");
            shared.set_state(ConnectionState::Failed);
            let _ = shared.signals.send(SessionSignal::GaveUp { attempts: attempt });
            return;
        }

        let delay = shared.policy.delay(attempt);
        attempt += 1;
        tracing::warn!(attempt, ?delay, "live connection lost ({failure}); reconnecting");
        shared.set_state(ConnectionState::Reconnecting);
        tokio::select! {
            _ = shutdown.notified() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn connect(shared: &Shared, credential: &SessionCredential, shutdown: &Notify) -> Attempt {
    let attempt = tokio::time::timeout(shared.connect_timeout, shared.transport.connect(credential));
    tokio::select! {
        _ = shutdown.notified() => Attempt::Shutdown,
        result = attempt => match result {
            Ok(Ok(conn)) => Attempt::Opened(conn),
            Ok(Err(err)) => Attempt::Failed(err),
            Err(_) => Attempt::Failed(TransportError::Timeout),
        },
    }
}

async fn pump(
    shared: &Shared,
    mut conn: Box<dyn Connection>,
    shutdown: &Notify,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> Ended {
    let mut delivered = false;
    let ended = loop {
        tokio::select! {
            _ = shutdown.notified() => break Ended::Shutdown,
            Some(out) = outbound.recv() => {
                if let Err(err) = conn.send(&out.event, out.payload).await {
                    tracing::warn!(event = %out.event, "outbound event not sent: {err}");
                }
            }
            next = conn.next_event() => match next {
                Some(Ok(event)) => {
                    delivered = true;
                    let report = shared.router.dispatch(&event);
                    tracing::debug!(
                        event = %event.name(),
                        delivered = report.delivered,
                        failures = report.failures.len(),
                        "live event dispatched"
                    );
                }
                Some(Err(error)) => break Ended::Failed { error, delivered },
                None => break Ended::Failed { error: TransportError::Closed, delivered },
            },
        }
    };
    conn.close().await;
    ended
}

fn fail_session(shared: &Shared, reason: String) {
    tracing::error!("live session invalid: {reason}");
    shared.set_state(ConnectionState::Failed);
    let _ = shared.signals.send(SessionSignal::Invalid { reason });
}
