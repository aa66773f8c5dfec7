//! `myduka-auth`: session credential lifecycle on the client side.
//!
//! Token issuance is a server concern; here the bearer token is opaque. This crate
//! owns where the credential lives (the [`Session`] context), how it survives a
//! restart (a [`CredentialStore`]) and how it is exchanged for a fresh one
//! ([`CredentialRefresher`]).

pub mod credential;
pub mod refresh;
pub mod roles;
pub mod session;
pub mod store;

pub use credential::{SessionCredential, UserProfile};
pub use refresh::{CredentialRefresher, HttpTokenExchange, RefreshError, TokenExchange};
pub use roles::Role;
pub use session::Session;
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore, PersistedSession, StoreError};
