//! `myduka-records`: client-side read models for the dashboards.
//!
//! Each domain (users, supplier payments, supply requests, notifications) is a
//! [`Domain`] binding a record shape to its REST resource and live event names.
//! All of them are held in the same generic [`ReconciledCollection`].

pub mod collection;
pub mod domain;
pub mod filter;
pub mod notifications;
pub mod payments;
pub mod supply_requests;
pub mod users;

pub use collection::{ReconcileError, Reconciled, ReconciledCollection};
pub use domain::{Domain, Placement, reconcile};
pub use filter::{Filterable, RecordFilter};
pub use notifications::{Notification, Notifications};
pub use payments::{PaymentRecord, Payments};
pub use supply_requests::{SupplyRequest, SupplyRequests};
pub use users::{StoreRef, UserRecord, Users};
