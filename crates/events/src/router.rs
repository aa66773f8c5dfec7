//! Named-event fan-out from the live connection to mounted screens.
//!
//! Delivery is **at-least-once** from the server's point of view: the same record
//! event may arrive twice (reconnects, server retries). Handlers must therefore be
//! idempotent; the reconcilers are.
//!
//! ## Ordering
//!
//! Handlers registered for the same name run in registration order, synchronously,
//! inside `dispatch`. Events are dispatched in delivery order by the single
//! connector task, so a handler never observes events out of order.
//!
//! ## Failure isolation
//!
//! A handler that returns an error or panics is reported in the
//! [`DispatchReport`] and logged; the remaining handlers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use crate::event::LiveEvent;

/// Callback invoked for every dispatched event with a matching name.
pub type Handler = Arc<dyn Fn(&LiveEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identity of one registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Registration {
    id: SubscriptionId,
    event: String,
    handler: Handler,
}

#[derive(Default)]
struct RouterInner {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl RouterInner {
    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        // Handlers never run under this lock, so poisoning only means a panic in
        // our own bookkeeping; the data is still consistent.
        self.registrations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut regs = self.registrations();
        let before = regs.len();
        regs.retain(|r| r.id != id);
        regs.len() != before
    }
}

/// One failed handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub message: String,
}

/// Outcome of a single `dispatch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-process publish/subscribe router for live events.
///
/// Cloning is cheap; clones share the same registrations.
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl core::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventRouter")
            .field("registrations", &self.inner.registrations().len())
            .finish()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `event`.
    ///
    /// The registration lives as long as the returned guard; dropping the guard
    /// unsubscribes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&LiveEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let event = event.into();
        tracing::debug!(subscription = %id, event = %event, "subscribed");

        self.inner.registrations().push(Registration {
            id,
            event: event.clone(),
            handler: Arc::new(handler),
        });

        Subscription {
            id,
            event,
            router: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Remove exactly the registration behind `subscription`.
    ///
    /// Safe to call repeatedly; later calls are no-ops.
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.cancel();
    }

    /// Remove a registration by id. Returns whether something was removed.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver `event` to every handler currently subscribed to its name.
    pub fn dispatch(&self, event: &LiveEvent) -> DispatchReport {
        let targets: Vec<(SubscriptionId, Handler)> = self
            .inner
            .registrations()
            .iter()
            .filter(|r| r.event == event.name())
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect();

        let mut report = DispatchReport::default();

        for (id, handler) in targets {
            report.delivered += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::warn!(
                subscription = %id,
                event = %event.name(),
                delivery_id = %event.delivery_id(),
                "event handler failed: {}",
                message
            );
            report.failures.push(HandlerFailure {
                subscription: id,
                message,
            });
        }

        if report.delivered == 0 {
            tracing::debug!(event = %event.name(), "no subscribers for event");
        }

        report
    }

    /// Convenience wrapper building the event from a name and payload.
    pub fn dispatch_named(&self, name: &str, payload: Value) -> DispatchReport {
        self.dispatch(&LiveEvent::new(name, payload))
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner
            .registrations()
            .iter()
            .filter(|r| r.event == event)
            .count()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Scoped registration on an [`EventRouter`].
///
/// Unsubscribes on drop, so a screen that holds its subscriptions releases them
/// on every exit path.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    event: String,
    router: Weak<RouterInner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Unsubscribe now. Idempotent.
    pub fn cancel(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(router) = self.router.upgrade() {
            if router.remove(self.id) {
                tracing::debug!(subscription = %self.id, event = %self.event, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
