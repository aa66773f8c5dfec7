//! Client configuration, read from `MYDUKA_*` environment variables.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use myduka_auth::Role;

use crate::policy::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid url: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be MERCHANT, ADMIN or CLERK, got {value:?}")]
    InvalidRole { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST base, always ending in `/` so relative joins keep its path.
    pub api_url: Url,
    pub ws_url: Url,
    pub connect_timeout: Duration,
    pub refresh_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Extra attempts for a transient fetch failure.
    pub fetch_retries: u32,
    pub per_page: u32,
    /// Bootstrap bearer token when no persisted session exists.
    pub auth_token: Option<String>,
    /// Role of the bootstrap token.
    pub bootstrap_role: Role,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_raw = get("MYDUKA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = normalize_base(&api_raw).map_err(|reason| ConfigError::InvalidUrl {
            var: "MYDUKA_API_URL",
            reason,
        })?;

        let ws_url = match get("MYDUKA_WS_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
                var: "MYDUKA_WS_URL",
                reason: e.to_string(),
            })?,
            None => derive_ws_url(&api_url).map_err(|reason| ConfigError::InvalidUrl {
                var: "MYDUKA_API_URL",
                reason,
            })?,
        };

        let number = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(var) {
                Some(value) => value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
                None => Ok(default),
            }
        };

        let reconnect = ReconnectPolicy::new(
            Duration::from_millis(number("MYDUKA_RECONNECT_BASE_MS", 1000)?),
            Duration::from_millis(number("MYDUKA_RECONNECT_CAP_MS", 5000)?),
            saturating_u32(number("MYDUKA_RECONNECT_MAX_ATTEMPTS", 5)?),
        );

        let bootstrap_role = match get("MYDUKA_ROLE") {
            Some(value) => value.parse::<Role>().map_err(|_| ConfigError::InvalidRole {
                var: "MYDUKA_ROLE",
                value,
            })?,
            None => Role::Merchant,
        };

        Ok(Self {
            api_url,
            ws_url,
            connect_timeout: Duration::from_millis(number("MYDUKA_CONNECT_TIMEOUT_MS", 10_000)?),
            refresh_timeout: Duration::from_millis(number("MYDUKA_REFRESH_TIMEOUT_MS", 10_000)?),
            reconnect,
            fetch_retries: saturating_u32(number("MYDUKA_FETCH_RETRIES", 2)?),
            per_page: saturating_u32(number("MYDUKA_PER_PAGE", 10)?).max(1),
            auth_token: get("MYDUKA_AUTH_TOKEN"),
            bootstrap_role,
        })
    }
}

fn saturating_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn normalize_base(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `http://host/api/` → `ws://host/ws`; `https` maps to `wss`.
fn derive_ws_url(api: &Url) -> Result<Url, String> {
    let mut ws = api.clone();
    let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
    ws.set_scheme(scheme).map_err(|_| format!("cannot derive websocket url from {api}"))?;
    ws.set_path("/ws");
    ws.set_query(None);
    Ok(ws)
}
