//! `myduka-core`: shared building blocks for the MyDuka live-sync client.
//!
//! This crate contains **pure** primitives (no IO, no async): identifiers, the
//! `Record` contract every reconciled entity implements, pagination metadata and
//! the error taxonomy shared by the REST and live layers.

pub mod error;
pub mod id;
pub mod pagination;
pub mod record;

pub use error::{ApiError, ErrorBody, ErrorClass};
pub use id::{RecordId, StoreId, UserId};
pub use pagination::PageMeta;
pub use record::{Patch, Record};
