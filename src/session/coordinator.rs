//! Session coordinator: owns the cached [`Configuration`] and the single
//! in-flight refresh, fans provider answers out to every queued caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::cache::configuration::{Configuration, DEFAULT_STALE_MARGIN};
use crate::error::{SessionError, SessionResult};
use crate::helpers::time::get_instant;
use crate::observability::metrics::Metrics;
use crate::session::correlation::CorrelationId;
use crate::sources::provider::AuthTokenProvider;

static OUTCOME_SUCCESS: &str = "success";
static OUTCOME_FAILURE: &str = "failure";

type Outcome = SessionResult<Arc<Configuration>>;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// how long before expiry a configuration counts as stale
    pub stale_margin: Duration,
    /// `None` waits for the provider indefinitely
    pub provider_timeout: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            stale_margin: DEFAULT_STALE_MARGIN,
            provider_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// no usable configuration, nothing in flight
    Empty,
    /// cached configuration is not stale
    Valid,
    /// a provider request is in flight
    Refreshing,
}

struct Waiter {
    id: u64,
    sender: oneshot::Sender<Outcome>,
}

struct RefreshRequest {
    waiters: Vec<Waiter>,
    dispatched_at: Instant,
    /// local deadline and the timeout it was derived from
    deadline: Option<(Instant, Duration)>,
}

impl RefreshRequest {
    fn resolve(self, outcome: &Outcome) {
        for waiter in self.waiters {
            // a receiver may already be gone; the others still get the outcome
            let _ = waiter.sender.send(outcome.clone());
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    current: Option<Arc<Configuration>>,
    /// correlation id -> queued callers; holds at most one entry
    pending: HashMap<CorrelationId, RefreshRequest>,
    next_waiter_id: u64,
}

impl SessionSlot {
    fn fresh(&self, now: Instant) -> Option<Arc<Configuration>> {
        self.current.as_ref().filter(|c| !c.is_stale(now)).cloned()
    }

    /// Keep the last-known configuration only while it can still be used.
    fn retain_if_fresh(&mut self, now: Instant) {
        if self.fresh(now).is_none() {
            self.current = None;
        }
    }

    /// Remove the in-flight request once its deadline has passed, even when
    /// no caller is left to notice it.
    fn take_expired(&mut self, now: Instant) -> Option<(CorrelationId, RefreshRequest)> {
        let correlation_id = self
            .pending
            .iter()
            .find(|(_, request)| request.deadline.is_some_and(|(deadline, _)| now >= deadline))
            .map(|(correlation_id, _)| *correlation_id)?;
        let request = self.pending.remove(&correlation_id)?;
        self.retain_if_fresh(now);
        Some((correlation_id, request))
    }
}

struct Inner {
    provider: Arc<dyn AuthTokenProvider>,
    options: CoordinatorOptions,
    metrics: Option<Arc<Metrics>>,
    slot: Mutex<SessionSlot>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        // every transition is a single assignment, a poisoned slot is still coherent
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, f: impl FnOnce(&Metrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    fn complete(&self, correlation_id: CorrelationId, raw_token: &str) {
        let now = get_instant();
        let parsed = Configuration::parse_with_margin(raw_token, now, self.options.stale_margin).map(Arc::new);

        let mut slot = self.lock();
        let Some(request) = slot.pending.remove(&correlation_id) else {
            drop(slot);
            self.ignore(correlation_id);
            return;
        };
        match &parsed {
            Ok(config) => {
                slot.current = Some(config.clone());
                info!(
                    correlation_id = %correlation_id,
                    waiters = request.waiters.len(),
                    expires_on = %config.expires_on(),
                    "session configuration refreshed"
                );
                self.record(|m| {
                    m.refresh_duration
                        .with_label_values(&[OUTCOME_SUCCESS])
                        .observe(request.dispatched_at.elapsed().as_secs_f64());
                    m.configuration_expiry_unix.set(config.expires_on().timestamp());
                });
            }
            Err(err) => {
                slot.retain_if_fresh(now);
                warn!(
                    correlation_id = %correlation_id,
                    waiters = request.waiters.len(),
                    error = %err,
                    "provider returned an unusable token"
                );
                self.record_failure(&request, err);
            }
        }
        drop(slot);
        request.resolve(&parsed);
    }

    fn fail(&self, correlation_id: CorrelationId, reason: String) {
        let mut slot = self.lock();
        let Some(request) = slot.pending.remove(&correlation_id) else {
            drop(slot);
            self.ignore(correlation_id);
            return;
        };
        slot.retain_if_fresh(get_instant());
        drop(slot);

        let err = SessionError::AuthenticationTokenProvider(reason);
        warn!(
            correlation_id = %correlation_id,
            waiters = request.waiters.len(),
            error = %err,
            "session refresh failed"
        );
        self.record_failure(&request, &err);
        request.resolve(&Err(err));
    }

    fn expire(&self, correlation_id: CorrelationId) {
        let mut slot = self.lock();
        let Some(request) = slot.pending.remove(&correlation_id) else {
            // answered or expired by another waiter in the meantime
            return;
        };
        slot.retain_if_fresh(get_instant());
        drop(slot);

        self.reject_expired(correlation_id, request);
    }

    /// Must be called with the request already removed from the slot.
    fn reject_expired(&self, correlation_id: CorrelationId, request: RefreshRequest) {
        let timeout = request.deadline.map(|(_, timeout)| timeout).unwrap_or_default();
        let err = SessionError::TokenProviderTimeout(timeout);
        warn!(
            correlation_id = %correlation_id,
            waiters = request.waiters.len(),
            timeout = ?timeout,
            "token provider timed out"
        );
        self.record_failure(&request, &err);
        request.resolve(&Err(err));
    }

    fn detach(&self, correlation_id: CorrelationId, waiter_id: u64) {
        let mut slot = self.lock();
        if let Some(request) = slot.pending.get_mut(&correlation_id) {
            request.waiters.retain(|w| w.id != waiter_id);
            debug!(
                correlation_id = %correlation_id,
                waiters = request.waiters.len(),
                "caller detached from refresh"
            );
        }
    }

    fn ignore(&self, correlation_id: CorrelationId) {
        debug!(correlation_id = %correlation_id, "ignoring answer for unknown correlation id");
        self.record(|m| m.stale_responses_ignored.inc());
    }

    fn record_failure(&self, request: &RefreshRequest, err: &SessionError) {
        self.record(|m| {
            m.refresh_failures.with_label_values(&[err.reason()]).inc();
            m.refresh_duration
                .with_label_values(&[OUTCOME_FAILURE])
                .observe(request.dispatched_at.elapsed().as_secs_f64());
        });
    }
}

/// Handle a provider uses to answer a refresh request.
///
/// Holds the coordinator weakly: answering after it is dropped does nothing.
#[derive(Clone)]
pub struct AuthTokenListener {
    inner: Weak<Inner>,
}

impl AuthTokenListener {
    pub fn on_success(&self, correlation_id: CorrelationId, raw_token: impl AsRef<str>) {
        match self.inner.upgrade() {
            Some(inner) => inner.complete(correlation_id, raw_token.as_ref()),
            None => debug!(correlation_id = %correlation_id, "coordinator dropped, token discarded"),
        }
    }

    pub fn on_failure(&self, correlation_id: CorrelationId, reason: impl Into<String>) {
        match self.inner.upgrade() {
            Some(inner) => inner.fail(correlation_id, reason.into()),
            None => debug!(correlation_id = %correlation_id, "coordinator dropped, failure discarded"),
        }
    }
}

/// Detaches a waiter whose `get_configuration` future is dropped before it resolves.
struct WaiterGuard<'a> {
    inner: &'a Inner,
    correlation_id: CorrelationId,
    waiter_id: u64,
    armed: bool,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.detach(self.correlation_id, self.waiter_id);
        }
    }
}

struct Ticket {
    correlation_id: CorrelationId,
    waiter_id: u64,
    receiver: oneshot::Receiver<Outcome>,
    deadline: Option<Instant>,
    dispatch: bool,
}

/// Hands out a valid [`Configuration`], refreshing it through the provider
/// when it is missing or stale.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    pub fn new(provider: Arc<dyn AuthTokenProvider>, options: CoordinatorOptions) -> Self {
        Self::build(provider, options, None)
    }

    pub fn with_metrics(
        provider: Arc<dyn AuthTokenProvider>,
        options: CoordinatorOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::build(provider, options, Some(metrics))
    }

    fn build(
        provider: Arc<dyn AuthTokenProvider>,
        options: CoordinatorOptions,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                options,
                metrics,
                slot: Mutex::new(SessionSlot::default()),
            }),
        }
    }

    /// Return the cached configuration, or wait for a refresh to produce one.
    ///
    /// Concurrent callers share a single provider request and observe the
    /// same outcome.
    pub async fn get_configuration(&self) -> SessionResult<Arc<Configuration>> {
        self.acquire(false).await
    }

    /// Ask the provider for a new credential even if the cached one is fresh.
    ///
    /// Joins the in-flight refresh if there is one. The cached configuration
    /// stays in place until the provider answers and is kept on failure while
    /// it is still fresh.
    pub async fn refresh(&self) -> SessionResult<Arc<Configuration>> {
        self.acquire(true).await
    }

    async fn acquire(&self, force: bool) -> SessionResult<Arc<Configuration>> {
        let ticket = match self.take_ticket(force) {
            Ok(config) => return Ok(config),
            Err(ticket) => ticket,
        };
        let Ticket { correlation_id, waiter_id, mut receiver, deadline, dispatch } = ticket;

        let mut guard = WaiterGuard {
            inner: self.inner.as_ref(),
            correlation_id,
            waiter_id,
            armed: true,
        };

        if dispatch {
            info!(correlation_id = %correlation_id, "requesting authentication token");
            self.inner.record(|m| m.refresh_requests.inc());
            self.inner.provider.request_token(correlation_id, self.listener());
        }

        let received = match deadline {
            Some(deadline) => match timeout_at(deadline, &mut receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.inner.expire(correlation_id);
                    receiver.await
                }
            },
            None => receiver.await,
        };
        guard.armed = false;

        received.unwrap_or_else(|_| {
            Err(SessionError::AuthenticationTokenProvider(
                "refresh was abandoned without an answer".into(),
            ))
        })
    }

    /// Fast path under the lock, or a ticket for the refresh to wait on.
    fn take_ticket(&self, force: bool) -> Result<Arc<Configuration>, Ticket> {
        let mut slot = self.inner.lock();
        let now = get_instant();
        let expired = slot.take_expired(now);
        let ticket = self.ticket_locked(&mut slot, now, force);
        drop(slot);

        if let Some((correlation_id, request)) = expired {
            self.inner.reject_expired(correlation_id, request);
        }
        ticket
    }

    fn ticket_locked(
        &self,
        slot: &mut SessionSlot,
        now: Instant,
        force: bool,
    ) -> Result<Arc<Configuration>, Ticket> {
        if !force {
            if let Some(config) = slot.fresh(now) {
                return Ok(config);
            }
        }

        let (correlation_id, dispatch) = match slot.pending.keys().next().copied() {
            Some(correlation_id) => {
                debug!(correlation_id = %correlation_id, "joining in-flight refresh");
                self.inner.record(|m| m.waiters_joined.inc());
                (correlation_id, false)
            }
            None => (CorrelationId::new(), true),
        };
        // an unrepresentable deadline means no deadline
        let deadline = self
            .inner
            .options
            .provider_timeout
            .and_then(|timeout| now.checked_add(timeout).map(|deadline| (deadline, timeout)));

        let waiter_id = slot.next_waiter_id;
        slot.next_waiter_id += 1;
        let (sender, receiver) = oneshot::channel();
        let request = slot
            .pending
            .entry(correlation_id)
            .or_insert_with(|| RefreshRequest {
                waiters: Vec::new(),
                dispatched_at: now,
                deadline,
            });
        request.waiters.push(Waiter { id: waiter_id, sender });

        Err(Ticket {
            correlation_id,
            waiter_id,
            receiver,
            deadline: request.deadline.map(|(deadline, _)| deadline),
            dispatch,
        })
    }

    /// Listener bound to this coordinator, for providers answering out of band.
    pub fn listener(&self) -> AuthTokenListener {
        AuthTokenListener {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> SessionState {
        let mut slot = self.inner.lock();
        let now = get_instant();
        let expired = slot.take_expired(now);
        let state = if !slot.pending.is_empty() {
            SessionState::Refreshing
        } else if slot.fresh(now).is_some() {
            SessionState::Valid
        } else {
            SessionState::Empty
        };
        drop(slot);

        if let Some((correlation_id, request)) = expired {
            self.inner.reject_expired(correlation_id, request);
        }
        state
    }

    /// Last-known configuration, stale or not, without triggering a refresh.
    pub fn current(&self) -> Option<Arc<Configuration>> {
        self.inner.lock().current.clone()
    }

    /// Number of callers currently queued on the in-flight refresh.
    pub fn waiting_callers(&self) -> usize {
        self.inner.lock().pending.values().map(|r| r.waiters.len()).sum()
    }

    /// Drop the cached configuration so the next call refreshes.
    ///
    /// An in-flight refresh is left untouched.
    pub fn invalidate(&self) {
        let mut slot = self.inner.lock();
        if slot.current.take().is_some() {
            info!("session configuration invalidated");
        }
    }
}
