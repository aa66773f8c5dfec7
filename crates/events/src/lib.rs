//! `myduka-events`: live event envelope and in-process routing.
//!
//! The transport hands every inbound named event to an [`EventRouter`]; mounted
//! screens register handlers on it and release them through the
//! [`Subscription`] guard when they unmount.

pub mod event;
pub mod router;

pub use event::{EventKind, LiveEvent, WireFrame};
pub use router::{DispatchReport, EventRouter, Handler, HandlerFailure, Subscription, SubscriptionId};
