//! `myduka-client`: the live-sync layer of the MyDuka dashboards.
//!
//! A [`Connector`] owns the session's single live connection and feeds every
//! inbound event to an [`EventRouter`](myduka_events::EventRouter). Mounted
//! [`Screen`]s subscribe to the router, seed their collections over REST and
//! reconcile live events into them.

pub mod boundary;
pub mod config;
pub mod connector;
pub mod fetch;
pub mod policy;
pub mod rest;
pub mod screen;
pub mod transport;
pub mod ws;

pub use boundary::{RenderOutcome, contain};
pub use config::{ClientConfig, ConfigError};
pub use connector::{ConnectionState, Connector, SessionSignal};
pub use fetch::{FetchGuard, FetchTicket};
pub use policy::ReconnectPolicy;
pub use rest::{ListQuery, Page, RestClient};
pub use screen::{ActionOutcome, FetchError, Notice, NoticeLevel, Screen};
pub use transport::{Connection, Transport, TransportError};
pub use ws::WsTransport;
