//! The refresh coordinator: single-flight renewal, proactive scheduling,
//! and the terminal sign-out transition.
//!
//! Both renewal triggers — the proactive timer and a consumer reporting a
//! rejected credential — funnel through one create-or-join gate, so the
//! renewal endpoint is never called twice concurrently no matter how many
//! consumers pile up.

use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::durable::DurableSource;
use crate::error::SessionError;
use crate::renew::RenewalClient;
use crate::scheduler::RefreshScheduler;
use crate::store::CredentialStore;

/// Lifecycle state of one logical session.
///
/// `SignedOut` is terminal: no transition leaves it. A new sign-in creates
/// a fresh coordinator instead of reviving this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Scheduled,
    Refreshing,
    SignedOut,
}

/// Why the session ended, passed to sign-out observers so the UI can
/// distinguish a forced logout from a user-initiated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The renewal endpoint explicitly rejected the durable credential.
    Rejected,
    /// A renewed credential could not be decoded.
    Malformed,
    /// No durable credential was available to exchange.
    MissingDurable,
    /// `force_sign_out` was called (user logged out).
    Explicit,
}

impl SignOutReason {
    fn from_error(error: &SessionError) -> Self {
        match error {
            SessionError::MalformedCredential(_) => Self::Malformed,
            _ => Self::Rejected,
        }
    }
}

/// Observer callback invoked exactly once on the terminal transition.
pub type SignOutCallback = Box<dyn Fn(SignOutReason) + Send + Sync>;

type RenewalOutcome = Result<Credential, SessionError>;

/// The at-most-one outstanding renewal. Waiters subscribe to the watch
/// channel instead of issuing their own renewal call.
struct PendingRenewal {
    generation: u64,
    tx: watch::Sender<Option<RenewalOutcome>>,
}

struct Inner {
    state: RefreshState,
    /// Bumped on sign-out; a renewal whose generation no longer matches
    /// resolves to nothing (its result is discarded).
    generation: u64,
    pending: Option<PendingRenewal>,
}

/// Keeps a short-lived bearer credential valid for any number of
/// concurrent consumers.
///
/// Owns the refresh state machine, the single-flight renewal guarantee,
/// the credential store lifecycle, and the proactive renewal timer.
/// Collaborators are constructor-injected; one instance per signed-in
/// session.
pub struct RefreshCoordinator<C: RenewalClient> {
    client: C,
    store: CredentialStore,
    durable: Arc<dyn DurableSource>,
    scheduler: RefreshScheduler,
    threshold: TimeDelta,
    inner: Mutex<Inner>,
    observers: Mutex<Vec<SignOutCallback>>,
}

impl<C: RenewalClient> RefreshCoordinator<C> {
    /// Create a coordinator. `threshold` is the renewal lead time: a
    /// credential with less than this much lifetime left is renewed
    /// before being handed out.
    #[must_use]
    pub fn new(
        client: C,
        store: CredentialStore,
        durable: Arc<dyn DurableSource>,
        threshold: TimeDelta,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            store,
            durable,
            scheduler: RefreshScheduler::new(),
            threshold,
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                generation: 0,
                pending: None,
            }),
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Current lifecycle state (for status displays and tests).
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.inner.lock().unwrap().state
    }

    /// Read access to the credential store for session observers.
    #[must_use]
    pub const fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// Register an observer for the terminal sign-out transition.
    /// Fired exactly once per coordinator lifetime.
    pub fn on_signed_out<F>(&self, callback: F)
    where
        F: Fn(SignOutReason) + Send + Sync + 'static,
    {
        self.observers.lock().unwrap().push(Box::new(callback));
    }

    /// Begin proactive scheduling from whatever credential is already
    /// stored (`Idle` → `Scheduled`). With an empty store this is a no-op;
    /// the first consumer call triggers the initial renewal instead.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionExpired` if the coordinator is
    /// already signed out.
    pub fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == RefreshState::SignedOut {
            return Err(SessionError::SessionExpired);
        }
        let Some(credential) = self.store.current() else {
            return Ok(());
        };
        Self::transition(&mut inner, RefreshState::Scheduled);
        // Armed under the state lock so a concurrent force_sign_out cannot
        // slip between the transition and the arm and leave a live timer
        // on a signed-out coordinator.
        self.arm_for_expiry(credential.expires_at);
        Ok(())
    }

    /// Seed the session from a freshly issued raw token (sign-in edge):
    /// decode its expiry, store it, and begin proactive scheduling.
    ///
    /// # Errors
    ///
    /// `MalformedCredential` if the token's expiry cannot be decoded;
    /// `SessionExpired` if the coordinator is already signed out.
    pub fn sign_in(self: &Arc<Self>, raw_token: &str) -> Result<Credential, SessionError> {
        let credential = Credential::from_raw(raw_token)?;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == RefreshState::SignedOut {
                return Err(SessionError::SessionExpired);
            }
            self.store.save(credential.clone());
            Self::transition(&mut inner, RefreshState::Scheduled);
            self.arm_for_expiry(credential.expires_at);
        }
        info!(expires_at = %credential.expires_at, "session credential seeded");
        Ok(credential)
    }

    /// A credential safe to attach to an outbound request.
    ///
    /// Returns the stored credential without suspending when it still has
    /// more than `threshold` lifetime left. Otherwise joins (or starts)
    /// the single in-flight renewal and waits for its outcome.
    ///
    /// # Errors
    ///
    /// `SessionExpired` once the coordinator is signed out (no network
    /// I/O is attempted); otherwise the classified renewal failure.
    pub async fn get_valid_credential(self: &Arc<Self>) -> Result<Credential, SessionError> {
        if self.inner.lock().unwrap().state == RefreshState::SignedOut {
            return Err(SessionError::SessionExpired);
        }
        if let Some(credential) = self.store.current() {
            if !credential.is_near_expiry(self.threshold) {
                return Ok(credential);
            }
        }
        self.renew().await
    }

    /// Called by the outbound-request layer when a request using
    /// `stale` was rejected for an authentication reason.
    ///
    /// If the stored credential already differs from `stale`, someone
    /// renewed after the request was issued and this is a no-op.
    /// Otherwise behaves like [`get_valid_credential`](Self::get_valid_credential)'s
    /// renewal path.
    ///
    /// # Errors
    ///
    /// Same classification as `get_valid_credential`.
    pub async fn report_rejected(self: &Arc<Self>, stale: &Credential) -> Result<(), SessionError> {
        if self.inner.lock().unwrap().state == RefreshState::SignedOut {
            return Err(SessionError::SessionExpired);
        }
        match self.store.current() {
            Some(current) if current.token != stale.token => {
                debug!("rejection reported for a superseded credential; ignoring");
                Ok(())
            }
            _ => self.renew().await.map(|_| ()),
        }
    }

    /// Immediately end the session: terminal state, cleared store,
    /// disarmed timer, observers notified. Idempotent. An in-flight
    /// renewal is not cancelled, but its eventual result is discarded.
    pub fn force_sign_out(&self) {
        let flight = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == RefreshState::SignedOut {
                return;
            }
            Self::transition(&mut inner, RefreshState::SignedOut);
            inner.generation += 1;
            self.store.clear();
            inner.pending.take()
        };
        if let Some(flight) = flight {
            flight.tx.send_replace(Some(Err(SessionError::SessionExpired)));
        }
        self.scheduler.disarm();
        self.notify_signed_out(SignOutReason::Explicit);
    }

    // --- Renewal internals ---

    /// Create-or-join gate. Checked-and-set atomically under the inner
    /// mutex: no pending renewal means this caller becomes the sole
    /// initiator; otherwise it merely awaits the existing one.
    async fn renew(self: &Arc<Self>) -> RenewalOutcome {
        enum Role {
            Initiator { generation: u64 },
            Waiter(watch::Receiver<Option<RenewalOutcome>>),
        }

        let role = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == RefreshState::SignedOut {
                return Err(SessionError::SessionExpired);
            }
            if let Some(pending) = &inner.pending {
                Role::Waiter(pending.tx.subscribe())
            } else {
                let (tx, _) = watch::channel(None);
                let generation = inner.generation;
                inner.pending = Some(PendingRenewal { generation, tx });
                Self::transition(&mut inner, RefreshState::Refreshing);
                Role::Initiator { generation }
            }
        };

        match role {
            Role::Waiter(rx) => Self::await_outcome(rx).await,
            Role::Initiator { generation } => self.drive_renewal(generation).await,
        }
    }

    /// Wait until the in-flight renewal resolves. Every waiter observes
    /// the same outcome.
    async fn await_outcome(mut rx: watch::Receiver<Option<RenewalOutcome>>) -> RenewalOutcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped unresolved: sign-out raced the renewal.
                return Err(SessionError::SessionExpired);
            }
        }
    }

    /// Sole initiator path: exactly one renewal call, then settle.
    async fn drive_renewal(self: &Arc<Self>, generation: u64) -> RenewalOutcome {
        info!(generation, "renewing session credential");
        let (result, terminal_reason) = match self.durable.load() {
            None => (
                Err(SessionError::RenewalRejected(
                    "no durable credential to exchange".into(),
                )),
                SignOutReason::MissingDurable,
            ),
            Some(durable) => {
                let result = self.client.renew(&durable).await;
                let reason = result
                    .as_ref()
                    .err()
                    .map_or(SignOutReason::Rejected, SignOutReason::from_error);
                (result, reason)
            }
        };
        self.settle(generation, result, terminal_reason)
    }

    /// Apply the renewal outcome: resolve all waiters, update the store
    /// and state machine, re-arm or disarm the scheduler.
    fn settle(
        self: &Arc<Self>,
        generation: u64,
        result: RenewalOutcome,
        terminal_reason: SignOutReason,
    ) -> RenewalOutcome {
        let mut inner = self.inner.lock().unwrap();
        let Some(flight) = inner.pending.take_if(|p| p.generation == generation) else {
            // force_sign_out invalidated this renewal while it was in
            // flight; whichever way the network call ended, the result
            // must not resurrect the session.
            debug!(generation, "discarding renewal result for a dead generation");
            return Err(SessionError::SessionExpired);
        };

        match result {
            Ok(credential) => {
                self.store.save(credential.clone());
                Self::transition(&mut inner, RefreshState::Scheduled);
                // Re-armed under the state lock: a force_sign_out cannot
                // interleave here and be left with a live timer on a
                // signed-out coordinator.
                self.arm_for_expiry(credential.expires_at);
                drop(inner);
                flight.tx.send_replace(Some(Ok(credential.clone())));
                info!(expires_at = %credential.expires_at, "session credential renewed");
                Ok(credential)
            }
            Err(error) if !error.is_terminal() => {
                Self::transition(&mut inner, RefreshState::Scheduled);
                // Re-arm only with a future deadline; a past one would
                // re-fire immediately and loop on an unreachable endpoint.
                if let Some(credential) = self.store.current() {
                    let fire_at = credential.expires_at - self.threshold;
                    if fire_at > Utc::now() {
                        self.arm_at(fire_at);
                    }
                }
                drop(inner);
                flight.tx.send_replace(Some(Err(error.clone())));
                warn!(%error, "renewal transport failure; next tick or request retries");
                Err(error)
            }
            Err(error) => {
                Self::transition(&mut inner, RefreshState::SignedOut);
                inner.generation += 1;
                self.store.clear();
                drop(inner);
                flight.tx.send_replace(Some(Err(error.clone())));
                self.scheduler.disarm();
                warn!(%error, "renewal failed terminally; signing out");
                self.notify_signed_out(terminal_reason);
                Err(error)
            }
        }
    }

    fn arm_for_expiry(self: &Arc<Self>, expires_at: DateTime<Utc>) {
        self.arm_at(expires_at - self.threshold);
    }

    fn arm_at(self: &Arc<Self>, fire_at: DateTime<Utc>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.scheduler.arm(fire_at, move || async move {
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            if let Err(error) = coordinator.renew().await {
                warn!(%error, "scheduled renewal failed");
            }
        });
    }

    fn transition(inner: &mut Inner, to: RefreshState) {
        if inner.state != to {
            debug!(from = ?inner.state, to = ?to, "refresh state transition");
            inner.state = to;
        }
    }

    fn notify_signed_out(&self, reason: SignOutReason) {
        info!(?reason, "session signed out");
        // The registry lock is released before invoking: a callback may
        // itself touch the coordinator (even re-register) without
        // deadlocking. Sign-out fires once, so draining loses nothing.
        let observers = std::mem::take(&mut *self.observers.lock().unwrap());
        for callback in &observers {
            callback(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::StaticDurableSource;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted renewal client: counts invocations, optionally sleeps to
    /// simulate network latency, pops one scripted outcome per call.
    struct MockRenewal {
        calls: AtomicUsize,
        outcomes: Mutex<VecDeque<RenewalOutcome>>,
        delay: Duration,
    }

    impl MockRenewal {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(VecDeque::new()),
                delay,
            })
        }

        fn push(self: &Arc<Self>, outcome: RenewalOutcome) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RenewalClient for Arc<MockRenewal> {
        async fn renew(&self, _durable: &crate::credential::DurableCredential) -> RenewalOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SessionError::Transport("mock outcomes exhausted".into())))
        }
    }

    fn cred(token: &str, secs_from_now: i64) -> Credential {
        Credential {
            token: token.into(),
            expires_at: Utc::now() + TimeDelta::seconds(secs_from_now),
        }
    }

    fn coordinator_with(
        client: Arc<MockRenewal>,
        stored: Option<Credential>,
    ) -> Arc<RefreshCoordinator<Arc<MockRenewal>>> {
        let store = stored.map_or_else(CredentialStore::new, CredentialStore::with_credential);
        RefreshCoordinator::new(
            client,
            store,
            Arc::new(StaticDurableSource::new("durable_secret")),
            TimeDelta::seconds(60),
        )
    }

    #[tokio::test]
    async fn fresh_credential_returned_without_renewal() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client.clone(), Some(cred("fresh", 3600)));

        let result = coordinator.get_valid_credential().await.expect("fresh");
        assert_eq!(result.token, "fresh");
        assert_eq!(client.calls(), 0, "no premature renewal");
    }

    #[tokio::test(start_paused = true)]
    async fn three_concurrent_calls_share_one_renewal() {
        let client = MockRenewal::new(Duration::from_millis(200));
        client.push(Ok(cred("renewed", 900)));
        let coordinator = coordinator_with(client.clone(), Some(cred("expired", -10)));

        let (a, b, c) = tokio::join!(
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
        );

        let a = a.expect("a");
        let b = b.expect("b");
        let c = c.expect("c");
        assert_eq!(a.token, "renewed");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(client.calls(), 1, "single-flight: exactly one renewal call");
    }

    #[tokio::test]
    async fn stale_rejection_is_ignored() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client.clone(), Some(cred("current", 3600)));

        let stale = cred("already-replaced", -5);
        coordinator.report_rejected(&stale).await.expect("no-op");
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn rejection_of_current_credential_renews_once() {
        let client = MockRenewal::new(Duration::ZERO);
        client.push(Ok(cred("renewed", 900)));
        let current = cred("current", 3600);
        let coordinator = coordinator_with(client.clone(), Some(current.clone()));

        coordinator.report_rejected(&current).await.expect("renews");
        assert_eq!(client.calls(), 1);
        assert_eq!(
            coordinator.credential_store().current().map(|c| c.token),
            Some("renewed".into())
        );
    }

    #[tokio::test]
    async fn transport_failure_is_retryable_not_terminal() {
        let client = MockRenewal::new(Duration::ZERO);
        client.push(Err(SessionError::Transport("connection refused".into())));
        client.push(Ok(cred("renewed", 900)));
        let coordinator = coordinator_with(client.clone(), Some(cred("expired", -10)));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        coordinator.on_signed_out(move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });

        let first = coordinator.get_valid_credential().await;
        assert!(matches!(first, Err(SessionError::Transport(_))));
        assert_eq!(coordinator.state(), RefreshState::Scheduled);

        let second = coordinator.get_valid_credential().await.expect("retry");
        assert_eq!(second.token, "renewed");
        assert_eq!(client.calls(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0, "no sign-out on transport fault");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_renewal_signs_out_all_waiters() {
        let client = MockRenewal::new(Duration::from_millis(100));
        client.push(Err(SessionError::RenewalRejected("invalid_grant".into())));
        let coordinator = coordinator_with(client.clone(), Some(cred("expired", -10)));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        coordinator.on_signed_out(move |reason| {
            assert_eq!(reason, SignOutReason::Rejected);
            observer.fetch_add(1, Ordering::SeqCst);
        });

        let (a, b, c, d, e) = tokio::join!(
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
            coordinator.get_valid_credential(),
        );

        for outcome in [a, b, c, d, e] {
            assert!(matches!(outcome, Err(SessionError::RenewalRejected(_))));
        }
        assert_eq!(client.calls(), 1);
        assert_eq!(coordinator.state(), RefreshState::SignedOut);
        assert!(coordinator.credential_store().current().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1, "observers fired exactly once");
    }

    #[tokio::test]
    async fn signed_out_is_sticky() {
        let client = MockRenewal::new(Duration::ZERO);
        client.push(Err(SessionError::RenewalRejected("invalid_grant".into())));
        let coordinator = coordinator_with(client.clone(), Some(cred("expired", -10)));

        let _ = coordinator.get_valid_credential().await;
        assert_eq!(coordinator.state(), RefreshState::SignedOut);

        let after = coordinator.get_valid_credential().await;
        assert!(matches!(after, Err(SessionError::SessionExpired)));
        assert_eq!(client.calls(), 1, "no network I/O once signed out");

        let rejected = coordinator.report_rejected(&cred("expired", -10)).await;
        assert!(matches!(rejected, Err(SessionError::SessionExpired)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_during_renewal_discards_its_result() {
        let client = MockRenewal::new(Duration::from_secs(5));
        client.push(Ok(cred("too-late", 900)));
        let coordinator = coordinator_with(client.clone(), Some(cred("expired", -10)));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        coordinator.on_signed_out(move |reason| {
            assert_eq!(reason, SignOutReason::Explicit);
            observer.fetch_add(1, Ordering::SeqCst);
        });

        let in_flight = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_valid_credential().await })
        };
        // Let the renewal start before pulling the plug.
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.force_sign_out();

        let outcome = in_flight.await.expect("task");
        assert!(matches!(outcome, Err(SessionError::SessionExpired)));
        assert_eq!(coordinator.state(), RefreshState::SignedOut);
        assert!(
            coordinator.credential_store().current().is_none(),
            "late success must not repopulate the store"
        );
        assert_eq!(client.calls(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(
            !coordinator.scheduler.is_armed(),
            "the late success must not leave a timer on a signed-out coordinator"
        );
    }

    #[tokio::test]
    async fn observer_may_touch_the_coordinator_without_deadlock() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client, Some(cred("current", 3600)));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        let reentrant = coordinator.clone();
        coordinator.on_signed_out(move |_| {
            // A UI layer reacting to sign-out typically reads session
            // state and may register further listeners; neither must
            // deadlock against the registry.
            assert_eq!(reentrant.state(), RefreshState::SignedOut);
            reentrant.on_signed_out(|_| {});
            observer.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.force_sign_out();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_sign_out_is_idempotent() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client, Some(cred("current", 3600)));

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        coordinator.on_signed_out(move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.force_sign_out();
        coordinator.force_sign_out();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), RefreshState::SignedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn near_expiry_credential_renews_immediately_on_start() {
        // Scenario: credential expires in 50s with a 60s threshold — the
        // armed deadline is already past, so renewal fires right away and
        // the scheduler re-arms against the new expiry.
        let client = MockRenewal::new(Duration::ZERO);
        client.push(Ok(cred("renewed", 900)));
        client.push(Ok(cred("renewed-again", 900)));
        let coordinator = coordinator_with(client.clone(), Some(cred("nearly-expired", 50)));

        coordinator.start().expect("start");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(client.calls(), 1, "immediate renewal on arm");
        assert_eq!(coordinator.state(), RefreshState::Scheduled);
        assert_eq!(
            coordinator.credential_store().current().map(|c| c.token),
            Some("renewed".into())
        );
        assert!(
            coordinator.scheduler.is_armed(),
            "re-armed for the new expiry minus threshold"
        );

        // The re-armed deadline is new expiry − threshold = 840s out:
        // just before it, nothing has fired; just after, the proactive
        // renewal runs.
        tokio::time::sleep(Duration::from_secs(835)).await;
        assert_eq!(client.calls(), 1, "no renewal before expiry − threshold");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.calls(), 2, "proactive renewal at expiry − threshold");
        assert_eq!(
            coordinator.credential_store().current().map(|c| c.token),
            Some("renewed-again".into())
        );
    }

    #[tokio::test]
    async fn start_with_empty_store_stays_idle() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client.clone(), None);

        coordinator.start().expect("start");
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn missing_durable_credential_is_terminal() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = RefreshCoordinator::new(
            client.clone(),
            CredentialStore::with_credential(cred("expired", -10)),
            Arc::new(StaticDurableSource::empty()),
            TimeDelta::seconds(60),
        );

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = reasons.clone();
        coordinator.on_signed_out(move |reason| {
            sink.lock().unwrap().push(reason);
        });

        let outcome = coordinator.get_valid_credential().await;
        assert!(matches!(outcome, Err(SessionError::RenewalRejected(_))));
        assert_eq!(coordinator.state(), RefreshState::SignedOut);
        assert_eq!(client.calls(), 0, "nothing to exchange, no network call");
        assert_eq!(&*reasons.lock().unwrap(), &[SignOutReason::MissingDurable]);
    }

    #[tokio::test]
    async fn sign_in_seeds_store_and_schedules() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client, None);

        let raw = crate::claims::make_jwt_with_exp(Utc::now().timestamp() + 900);
        let credential = coordinator.sign_in(&raw).expect("sign in");

        assert_eq!(coordinator.state(), RefreshState::Scheduled);
        assert_eq!(
            coordinator.credential_store().current(),
            Some(credential)
        );
        assert!(coordinator.scheduler.is_armed());
    }

    #[tokio::test]
    async fn sign_in_rejects_garbage_token() {
        let client = MockRenewal::new(Duration::ZERO);
        let coordinator = coordinator_with(client, None);

        let result = coordinator.sign_in("not-a-jwt");
        assert!(matches!(result, Err(SessionError::MalformedCredential(_))));
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }
}
