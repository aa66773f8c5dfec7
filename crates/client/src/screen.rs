//! A mounted view over one domain: seeded over REST, kept live by events.
//!
//! `Screen<D>` ties together the pieces a dashboard page needs:
//!
//! - a shared [`ReconciledCollection`] mutated only under its lock
//! - one router [`Subscription`] per live event name of the domain, held only
//!   while mounted
//! - a [`FetchGuard`] so the most recently issued fetch wins and results that
//!   land after unmount are dropped
//! - the latest short-lived [`Notice`] for the status line
//!
//! Unmounting never touches the session-wide connector.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use myduka_core::{ApiError, Patch, Record, RecordId};
use myduka_events::{EventRouter, LiveEvent, Subscription};
use myduka_records::{Domain, RecordFilter, ReconciledCollection, reconcile};

use crate::config::ClientConfig;
use crate::fetch::FetchGuard;
use crate::policy::ReconnectPolicy;
use crate::rest::{ListQuery, Page, RestClient};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch superseded by a newer request")]
    Stale,

    #[error("screen is no longer mounted")]
    Unmounted,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Short-lived user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub ttl: Duration,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        let ttl = match level {
            NoticeLevel::Info => Duration::from_secs(3),
            NoticeLevel::Warning | NoticeLevel::Error => Duration::from_secs(6),
        };
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
            ttl,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        now - self.created_at >= ttl
    }
}

/// What the caller should do after a confirmed (or refused) mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// The record was already gone; reload the list.
    Reseed,
    Rejected,
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub struct Screen<D: Domain> {
    collection: Shared<ReconciledCollection<D::Record>>,
    notice: Shared<Option<Notice>>,
    subscriptions: Mutex<Vec<Subscription>>,
    guard: FetchGuard,
    retry: ReconnectPolicy,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain> core::fmt::Debug for Screen<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Screen")
            .field("domain", &D::NAME)
            .field("mounted", &self.is_mounted())
            .field("records", &lock(&self.collection).len())
            .finish()
    }
}

impl<D: Domain> Screen<D> {
    /// `retry` governs transient fetch failures; `max_attempts` is the number of
    /// extra attempts after the first.
    pub fn new(retry: ReconnectPolicy) -> Self {
        let guard = FetchGuard::new();
        guard.invalidate();
        Self {
            collection: Arc::new(Mutex::new(D::collection())),
            notice: Arc::new(Mutex::new(None)),
            subscriptions: Mutex::new(Vec::new()),
            guard,
            retry,
            _domain: PhantomData,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(ReconnectPolicy::new(
            config.reconnect.base_delay(),
            config.reconnect.max_delay(),
            config.fetch_retries,
        ))
    }

    /// Subscribe to the domain's live events. Mounting twice is a no-op.
    pub fn mount(&self, router: &EventRouter) {
        let mut subs = lock(&self.subscriptions);
        if !subs.is_empty() {
            return;
        }
        for (name, _) in D::events() {
            let collection = Arc::clone(&self.collection);
            subs.push(router.subscribe(*name, move |event: &LiveEvent| {
                let mut c = lock(&collection);
                reconcile::<D>(&mut c, event)?;
                Ok(())
            }));
        }
        self.guard.revive();
        tracing::debug!(domain = D::NAME, events = subs.len(), "screen mounted");
    }

    /// Drop subscriptions and retire in-flight fetches.
    pub fn unmount(&self) {
        let released = std::mem::take(&mut *lock(&self.subscriptions));
        self.guard.invalidate();
        if !released.is_empty() {
            tracing::debug!(domain = D::NAME, events = released.len(), "screen unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        !lock(&self.subscriptions).is_empty()
    }

    /// Seed the collection from `fetch`, retrying transient failures.
    ///
    /// Results from a fetch that is no longer the newest, or that land after
    /// unmount, are discarded. On failure the previous records stay and a
    /// notice is raised.
    pub async fn refresh<F, Fut>(&self, mut fetch: F) -> Result<(), FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Page<D::Record>, ApiError>>,
    {
        let ticket = self.guard.begin();
        let mut attempt = 0u32;

        loop {
            let result = fetch().await;

            if !self.guard.is_current(ticket) {
                let reason = if self.guard.is_retired() {
                    FetchError::Unmounted
                } else {
                    FetchError::Stale
                };
                tracing::debug!(domain = D::NAME, generation = ticket.generation(), "{reason}; result dropped");
                return Err(reason);
            }

            match result {
                Ok(page) => {
                    lock(&self.collection).seed(page.records, page.meta);
                    let mut notice = lock(&self.notice);
                    if notice.as_ref().is_some_and(|n| n.level == NoticeLevel::Error) {
                        *notice = None;
                    }
                    return Ok(());
                }
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = match &err {
                        ApiError::RateLimited {
                            retry_after: Some(wait),
                        } => *wait,
                        _ => self.retry.delay(attempt),
                    };
                    attempt += 1;
                    tracing::warn!(domain = D::NAME, attempt, ?delay, "fetch failed ({err}); retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(domain = D::NAME, "fetch failed: {err}");
                    self.set_notice(Notice::error(err.user_message()));
                    return Err(err.into());
                }
            }
        }
    }

    /// Fetch one page of the domain's resource through `client`.
    pub async fn load(&self, client: &RestClient, query: &ListQuery) -> Result<(), FetchError> {
        self.refresh(|| client.list::<D>(query)).await
    }

    /// Apply the server's answer to a mutation of one record.
    pub fn apply_action_result(&self, result: Result<D::Record, ApiError>) -> ActionOutcome {
        match result {
            Ok(record) => {
                let mut c = lock(&self.collection);
                if c.contains(record.id()) {
                    let patch = serde_json::to_value(&record).ok().and_then(Patch::from_value);
                    let merged = patch.map(|p| c.apply_update(&p));
                    if !matches!(merged, Some(Ok(_))) {
                        tracing::warn!(domain = D::NAME, id = %record.id(), "confirmed record could not be merged");
                        return ActionOutcome::Reseed;
                    }
                } else {
                    c.apply_create(record);
                }
                ActionOutcome::Applied
            }
            Err(err) => self.action_failed(err),
        }
    }

    /// Apply the server's answer to a deletion.
    ///
    /// A record the server no longer knows is dropped locally too, but the
    /// list is stale: the caller gets a notice and a reseed request.
    pub fn apply_removal(&self, id: RecordId, result: Result<(), ApiError>) -> ActionOutcome {
        match result {
            Ok(()) => {
                lock(&self.collection).apply_delete(id);
                ActionOutcome::Applied
            }
            Err(err @ ApiError::NotFound(_)) => {
                lock(&self.collection).apply_delete(id);
                self.action_failed(err)
            }
            Err(err) => self.action_failed(err),
        }
    }

    fn action_failed(&self, err: ApiError) -> ActionOutcome {
        self.set_notice(Notice::error(err.user_message()));
        match err {
            ApiError::NotFound(_) => ActionOutcome::Reseed,
            _ => ActionOutcome::Rejected,
        }
    }

    pub fn apply_filter(&self, filter: RecordFilter) {
        lock(&self.collection).apply_filter(filter);
    }

    /// Run `f` against the collection under its lock.
    pub fn with_collection<R>(&self, f: impl FnOnce(&ReconciledCollection<D::Record>) -> R) -> R {
        f(&lock(&self.collection))
    }

    /// Mutate the collection under its lock (optimistic local updates).
    pub fn update_collection<R>(&self, f: impl FnOnce(&mut ReconciledCollection<D::Record>) -> R) -> R {
        f(&mut lock(&self.collection))
    }

    pub fn records(&self) -> Vec<D::Record> {
        lock(&self.collection).records().to_vec()
    }

    pub fn set_notice(&self, notice: Notice) {
        *lock(&self.notice) = Some(notice);
    }

    /// The current notice, unless it has expired.
    pub fn notice(&self) -> Option<Notice> {
        let mut slot = lock(&self.notice);
        if slot.as_ref().is_some_and(|n| n.is_expired(Utc::now())) {
            *slot = None;
        }
        slot.clone()
    }
}

impl<D: Domain> Drop for Screen<D> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use myduka_core::PageMeta;
    use myduka_records::supply_requests::PENDING;
    use myduka_records::{SupplyRequest, SupplyRequests};
    use serde_json::json;

    fn request(id: i64, product: &str) -> SupplyRequest {
        serde_json::from_value(json!({"id": id, "product_name": product, "status": "PENDING"})).unwrap()
    }

    fn page(records: Vec<SupplyRequest>) -> Page<SupplyRequest> {
        let meta = PageMeta::single_page(records.len());
        Page { records, meta }
    }

    fn screen() -> Screen<SupplyRequests> {
        Screen::new(ReconnectPolicy::new(Duration::from_millis(100), Duration::from_millis(500), 2))
    }

    fn ids(screen: &Screen<SupplyRequests>) -> Vec<i64> {
        screen.records().iter().map(|r| r.id.get()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn later_fetch_wins_even_if_earlier_one_resolves_last() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);

        let slow_a = || async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, ApiError>(page(vec![request(1, "A")]))
        };
        let fast_b = || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, ApiError>(page(vec![request(2, "B")]))
        };

        let (a, b) = tokio::join!(s.refresh(slow_a), s.refresh(fast_b));

        assert_eq!(a, Err(FetchError::Stale));
        assert_eq!(b, Ok(()));
        assert_eq!(ids(&s), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn results_after_unmount_are_dropped() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);

        let fetch = || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>(page(vec![request(1, "A")]))
        };
        let unmount_soon = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            s.unmount();
        };

        let (result, ()) = tokio::join!(s.refresh(fetch), unmount_soon);

        assert_eq!(result, Err(FetchError::Unmounted));
        assert!(s.records().is_empty());
        assert_eq!(router.subscriber_count("supply_request_created"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_within_bounds() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);
        let calls = AtomicUsize::new(0);

        let result = s
            .refresh(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::network("connection reset"))
                    } else {
                        Ok(page(vec![request(1, "A")]))
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(ids(&s), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_for_server_delay() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        s.refresh(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::RateLimited {
                        retry_after: Some(Duration::from_secs(3)),
                    })
                } else {
                    Ok(page(vec![]))
                }
            }
        })
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_seed_keeps_previous_records_and_raises_notice() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);
        s.refresh(|| async { Ok::<_, ApiError>(page(vec![request(1, "A")])) })
            .await
            .unwrap();

        let err = s
            .refresh(|| async {
                Err(ApiError::Rejected {
                    status: 400,
                    message: "Invalid store".to_string(),
                    code: None,
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Api(ApiError::Rejected { .. })));
        assert_eq!(ids(&s), vec![1]);
        let notice = s.notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Invalid store");
    }

    #[tokio::test]
    async fn live_events_reach_the_collection_only_while_mounted() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);
        s.mount(&router);
        assert_eq!(router.subscriber_count("supply_request_created"), 1);

        router.dispatch_named("supply_request_created", json!({"id": 7, "product_name": "Tea"}));
        s.apply_filter(RecordFilter::status(PENDING));
        assert_eq!(s.with_collection(|c| c.visible_count()), 1);

        s.unmount();
        router.dispatch_named("supply_request_created", json!({"id": 8, "product_name": "Milk"}));
        assert_eq!(ids(&s), vec![7]);
        assert!(!s.is_mounted());
    }

    #[tokio::test]
    async fn confirmed_actions_merge_and_missing_records_request_reseed() {
        let router = EventRouter::new();
        let s = screen();
        s.mount(&router);
        s.refresh(|| async { Ok::<_, ApiError>(page(vec![request(1, "A")])) })
            .await
            .unwrap();

        let mut approved = request(1, "A");
        approved.status = "APPROVED".to_string();
        assert_eq!(s.apply_action_result(Ok(approved)), ActionOutcome::Applied);
        assert_eq!(s.records()[0].status, "APPROVED");

        let outcome = s.apply_action_result(Err(ApiError::NotFound("Supply request not found".to_string())));
        assert_eq!(outcome, ActionOutcome::Reseed);
        assert_eq!(s.notice().unwrap().message, "Supply request not found");

        assert_eq!(s.apply_removal(RecordId::new(1), Ok(())), ActionOutcome::Applied);
        assert!(s.records().is_empty());

        s.refresh(|| async { Ok::<_, ApiError>(page(vec![request(9, "A")])) })
            .await
            .unwrap();
        let gone = s.apply_removal(RecordId::new(9), Err(ApiError::NotFound("User not found".to_string())));
        assert_eq!(gone, ActionOutcome::Reseed);
        assert_eq!(s.notice().unwrap().message, "User not found");
        assert!(s.records().is_empty());
    }

    #[test]
    fn notices_expire_after_ttl() {
        let notice = Notice::info("Saved");
        assert!(!notice.is_expired(notice.created_at));
        assert!(notice.is_expired(notice.created_at + chrono::Duration::seconds(3)));
    }
}
