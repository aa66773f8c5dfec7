//! `myduka-live`: headless live-sync session for one MyDuka account.
//!
//! Restores the persisted session (or bootstraps one from `MYDUKA_AUTH_TOKEN`),
//! opens the live connection, mounts the screens the role can see and logs a
//! summary as events arrive. Ctrl-C closes the connection cleanly.
//!
//! The process exits when the session becomes invalid (refresh rejected, or the
//! api answering 401/422). Exhausted reconnect attempts only pause the live
//! connection until the next scheduled reconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};

use myduka_auth::{CredentialRefresher, FileCredentialStore, HttpTokenExchange, Role, Session, SessionCredential};
use tokio::time::Instant;
use myduka_client::{
    ClientConfig, ConnectionState, Connector, ListQuery, RenderOutcome, RestClient, Screen, SessionSignal,
    WsTransport, contain,
};
use myduka_events::EventRouter;
use myduka_records::{Notifications, Payments, SupplyRequests, Users};

const SUMMARY_EVERY: Duration = Duration::from_secs(30);
/// Pause after the connector gives up before trying again.
const RECONNECT_AFTER_GIVING_UP: Duration = Duration::from_secs(60);

enum Reload {
    Done,
    Interrupted,
}

struct Dashboard {
    notifications: Screen<Notifications>,
    supply_requests: Option<Screen<SupplyRequests>>,
    payments: Option<Screen<Payments>>,
    users: Option<Screen<Users>>,
}

impl Dashboard {
    fn for_role(role: Role, config: &ClientConfig) -> Self {
        let manages_staff = role != Role::Clerk;
        Self {
            notifications: Screen::from_config(config),
            supply_requests: Some(Screen::from_config(config)),
            payments: manages_staff.then(|| Screen::from_config(config)),
            users: manages_staff.then(|| Screen::from_config(config)),
        }
    }

    fn mount(&self, router: &EventRouter) {
        self.notifications.mount(router);
        if let Some(s) = &self.supply_requests {
            s.mount(router);
        }
        if let Some(s) = &self.payments {
            s.mount(router);
        }
        if let Some(s) = &self.users {
            s.mount(router);
        }
    }

    async fn load(&self, rest: &RestClient, per_page: u32) {
        let query = ListQuery::new(1, per_page);
        if let Err(err) = self.notifications.load(rest, &query).await {
            tracing::warn!("notifications not loaded: {err}");
        }
        if let Some(s) = &self.supply_requests {
            if let Err(err) = s.load(rest, &query).await {
                tracing::warn!("supply requests not loaded: {err}");
            }
        }
        if let Some(s) = &self.payments {
            if let Err(err) = s.load(rest, &query).await {
                tracing::warn!("payments not loaded: {err}");
            }
        }
        if let Some(s) = &self.users {
            if let Err(err) = s.load(rest, &query).await {
                tracing::warn!("users not loaded: {err}");
            }
        }
    }

    fn unmount(&self) {
        self.notifications.unmount();
        if let Some(s) = &self.supply_requests {
            s.unmount();
        }
        if let Some(s) = &self.payments {
            s.unmount();
        }
        if let Some(s) = &self.users {
            s.unmount();
        }
    }

    fn summary(&self) -> String {
        let mut parts = vec![format!(
            "unread notifications: {}",
            self.notifications.with_collection(Notifications::unread_count)
        )];
        if let Some(s) = &self.supply_requests {
            parts.push(format!("pending requests: {}", s.with_collection(SupplyRequests::pending_count)));
        }
        if let Some(s) = &self.payments {
            parts.push(format!("unpaid entries: {}", s.with_collection(Payments::unpaid_count)));
        }
        if let Some(s) = &self.users {
            parts.push(format!("users online: {}", s.with_collection(Users::online_count)));
        }
        parts.join(", ")
    }
}

/// Reload every screen unless Ctrl-C arrives first.
async fn reload(dashboard: &Dashboard, rest: &RestClient, per_page: u32) -> Reload {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => Reload::Interrupted,
        _ = dashboard.load(rest, per_page) => Reload::Done,
    }
}

fn bootstrap_session(config: &ClientConfig) -> anyhow::Result<Arc<Session>> {
    let store = Arc::new(FileCredentialStore::default_location().context("locating session store")?);
    tracing::debug!(path = %store.path().display(), "session store");
    let session = Session::restore(store).context("restoring persisted session")?;

    if !session.is_authenticated() {
        let Some(token) = config.auth_token.clone() else {
            bail!("no persisted session; set MYDUKA_AUTH_TOKEN to start one");
        };
        session
            .login(SessionCredential::new(token, config.bootstrap_role), None)
            .context("persisting bootstrap session")?;
    }

    Ok(Arc::new(session))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    myduka_observability::init();

    let config = ClientConfig::from_env()?;
    tracing::info!(api = %config.api_url, ws = %config.ws_url, "starting live session");

    let session = bootstrap_session(&config)?;
    let Some(credential) = session.credential() else {
        bail!("session has no credential");
    };
    let role = credential.role();

    let exchange = Arc::new(HttpTokenExchange::new(&config.api_url, config.refresh_timeout)?);
    let refresher = Arc::new(CredentialRefresher::new(
        exchange,
        Arc::clone(&session),
        config.refresh_timeout,
    ));
    let rest = RestClient::new(config.api_url.clone(), Arc::clone(&session), config.connect_timeout)?;

    let router = EventRouter::new();
    let (connector, mut signals) = Connector::new(
        Arc::new(WsTransport::new(config.ws_url.clone())),
        refresher,
        router.clone(),
        config.reconnect,
        config.connect_timeout,
    );

    let dashboard = Dashboard::for_role(role, &config);
    dashboard.mount(&router);
    connector.open(credential).await;

    let mut state = connector.watch_state();
    let mut ticker = tokio::time::interval(SUMMARY_EVERY);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut revive_at: Option<Instant> = None;

    let outcome = 'session: {
        if let Reload::Interrupted = reload(&dashboard, &rest, config.per_page).await {
            break 'session Ok(());
        }
        loop {
            // A 401/422 from the api logs the session out inside the rest client.
            if !session.is_authenticated() {
                break Err(anyhow::anyhow!("the api rejected the credential; logged out"));
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received; closing");
                    break Ok(());
                }
                signal = signals.recv() => match signal {
                    Some(SessionSignal::Invalid { reason }) => {
                        session.logout();
                        break Err(anyhow::anyhow!("session invalid, logged out: {reason}"));
                    }
                    Some(SessionSignal::GaveUp { attempts }) => {
                        tracing::error!(
                            attempts,
                            retry_in = ?RECONNECT_AFTER_GIVING_UP,
                            "live connection lost; screens keep their last state"
                        );
                        revive_at = Some(Instant::now() + RECONNECT_AFTER_GIVING_UP);
                    }
                    None => break Ok(()),
                },
                _ = tokio::time::sleep_until(revive_at.unwrap_or_else(Instant::now)), if revive_at.is_some() => {
                    revive_at = None;
                    if let Err(err) = connector.reconnect().await {
                        tracing::warn!("scheduled reconnect not started: {err}");
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    // Reseed after a reconnect so events missed while offline show up.
                    let connected = *state.borrow_and_update() == ConnectionState::Connected;
                    if connected {
                        if let Reload::Interrupted = reload(&dashboard, &rest, config.per_page).await {
                            tracing::info!("interrupt received; closing");
                            break Ok(());
                        }
                    }
                }
                _ = ticker.tick() => {
                    match contain("dashboard", || dashboard.summary()) {
                        RenderOutcome::Rendered(line) => tracing::info!("{line}"),
                        RenderOutcome::Failed { message, .. } => tracing::error!("summary unavailable: {message}"),
                    }
                }
            }
        }
    };

    dashboard.unmount();
    connector.close().await;
    outcome
}
