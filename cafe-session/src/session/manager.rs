//! The session manager.
//!
//! [`SessionManager`] owns the canonical identity. Every change to it goes
//! through one of the manager's operations, which keep the background tasks
//! in step with the state: entering the authenticated state starts a fresh
//! [`RefreshScheduler`] (and a [`VisibilityMonitor`] when a visibility signal
//! was supplied), leaving it stops them.
//!
//! Each transition into or out of the authenticated state bumps a generation
//! counter. Work that was started under an older generation (a validation that
//! was in flight during a logout, a scheduled renewal that outlived its
//! session) is discarded instead of being applied.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cafe_transport::{SessionEvent, SessionEventBus};
use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{AuthPhase, AuthState};
use crate::api::{AuthApi, RegisterData, Session};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::scheduler::RefreshScheduler;
use crate::visibility::{VisibilityMonitor, VisibilitySignal};

pub(crate) const LOGIN_FAILED: &str = "Login failed";
pub(crate) const REGISTRATION_FAILED: &str = "Registration failed";
pub(crate) const SESSION_EXPIRED: &str = "Session expired. Please log in again.";

/// Result of a forced renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Credentials were renewed and the identity re-validated.
    Renewed,
    /// Another renewal was already in flight.
    Skipped,
    /// Renewal succeeded but the session changed meanwhile; nothing applied.
    Stale,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    api: Arc<dyn AuthApi>,
    config: SessionConfig,
    events: Option<SessionEventBus>,
    visibility: Option<VisibilitySignal>,
}

impl SessionManagerBuilder {
    pub fn new(api: Arc<dyn AuthApi>, config: SessionConfig) -> Self {
        Self {
            api,
            config,
            events: None,
            visibility: None,
        }
    }

    /// Share an existing bus, typically the one the transport publishes on.
    pub fn events(mut self, events: SessionEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Re-validate the session whenever this signal reports the foreground.
    pub fn visibility(mut self, signal: VisibilitySignal) -> Self {
        self.visibility = Some(signal);
        self
    }

    pub fn build(self) -> Arc<SessionManager> {
        Arc::new_cyclic(|this| SessionManager {
            api: self.api,
            config: self.config,
            events: self.events.unwrap_or_default(),
            visibility: self.visibility,
            inner: RwLock::new(Inner::default()),
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
            own_expiries: AtomicUsize::new(0),
            lifecycle: CancellationToken::new(),
            initialized: AtomicBool::new(false),
            this: this.clone(),
        })
    }
}

#[derive(Default)]
struct Inner {
    state: AuthState,
    generation: u64,
    tasks: Option<SessionTasks>,
}

/// Background tasks bound to one authenticated session.
struct SessionTasks {
    scheduler: RefreshScheduler,
    monitor: Option<VisibilityMonitor>,
}

impl SessionTasks {
    fn stop(self) {
        self.scheduler.stop();
        if let Some(monitor) = self.monitor {
            monitor.stop();
        }
    }
}

/// Releases the single-flight renewal flag on drop.
pub(crate) struct RefreshGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owner of the session state and its background tasks.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    config: SessionConfig,
    events: SessionEventBus,
    visibility: Option<VisibilitySignal>,
    inner: RwLock<Inner>,
    /// Single-flight flag shared by scheduled and forced renewals.
    refresh_in_flight: Arc<AtomicBool>,
    /// Expired signals published by this manager that its own listener must skip.
    own_expiries: AtomicUsize,
    lifecycle: CancellationToken,
    initialized: AtomicBool,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn builder(api: Arc<dyn AuthApi>, config: SessionConfig) -> SessionManagerBuilder {
        SessionManagerBuilder::new(api, config)
    }

    /// Start listening for expiry signals and run the first validation.
    ///
    /// Calling it again is a no-op.
    pub async fn init(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.spawn_expiry_listener();
        self.validate_session().await;
        info!(phase = %self.phase(), "Session manager initialized");
    }

    /// Stop every background task. Idempotent.
    ///
    /// After teardown no new scheduler is started, even on login.
    pub fn teardown(&self) {
        self.lifecycle.cancel();
        let tasks = self.inner.write().tasks.take();
        if let Some(tasks) = tasks {
            tasks.stop();
            debug!("Session tasks stopped");
        }
    }

    /// Log in by phone number.
    ///
    /// Returns false on failure, with the reason in [`AuthState::last_error`].
    pub async fn login(&self, phone_number: &str) -> bool {
        match self.api.login(phone_number).await {
            Ok(session) => {
                info!(user_id = session.id, "Logged in");
                self.apply(Some(session));
                true
            }
            Err(err) => {
                warn!(error = %err, "Login failed");
                self.record_error(err.user_message(LOGIN_FAILED));
                false
            }
        }
    }

    /// Register a new account and install it as the session.
    pub async fn register(&self, data: &RegisterData) -> bool {
        match self.api.register(data).await {
            Ok(session) => {
                info!(user_id = session.id, "Registered");
                self.apply(Some(session));
                true
            }
            Err(err) => {
                warn!(error = %err, "Registration failed");
                self.record_error(err.user_message(REGISTRATION_FAILED));
                false
            }
        }
    }

    /// Log out.
    ///
    /// The remote invalidation is best effort. The local session is always
    /// cleared and an expiry signal is always published.
    pub async fn logout(&self) {
        let user_id = self.inner.read().state.session.as_ref().map(|s| s.id);

        if let Some(user_id) = user_id
            && let Err(err) = self.api.logout(user_id).await
        {
            warn!(user_id, error = %err, "Remote logout failed, clearing local session anyway");
        }

        let cleared = {
            let mut inner = self.inner.write();
            let cleared = self.transition(&mut inner, None);
            inner.state.last_error = None;
            cleared
        };
        if cleared {
            self.events.publish(SessionEvent::StateChanged);
        }
        info!("Logged out");

        if self.listener_active() {
            self.own_expiries.fetch_add(1, Ordering::SeqCst);
        }
        self.events.publish(SessionEvent::Expired);
    }

    /// Fetch the current identity from the server.
    ///
    /// Any failure clears the session. A rejection of the credentials also
    /// reports the session as expired. A result that arrives after the
    /// session changed is dropped.
    pub async fn validate_session(&self) {
        let generation = self.generation();
        match self.api.current_session().await {
            Ok(session) => {
                if !self.apply_if_current(generation, session) {
                    debug!("Discarding stale validation result");
                }
            }
            Err(err) => {
                debug!(error = %err, "Session validation failed");
                let reason = err.is_unauthorized().then_some(SESSION_EXPIRED);
                if !self.clear_if_current(generation, reason) {
                    debug!("Discarding stale validation failure");
                }
            }
        }
    }

    /// Renew credentials now, outside the schedule.
    ///
    /// Shares the single-flight flag with the scheduler: if a renewal is
    /// already in flight this returns [`RefreshOutcome::Skipped`].
    pub async fn refresh_session(&self) -> Result<RefreshOutcome> {
        let Some(_guard) = self.try_begin_refresh() else {
            debug!("Renewal already in flight, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let outcome = self.renew_and_revalidate(self.generation()).await?;
        if outcome == RefreshOutcome::Renewed
            && let Some(tasks) = self.inner.read().tasks.as_ref()
        {
            tasks.scheduler.reset_failures();
        }
        Ok(outcome)
    }

    /// Replace the identity, e.g. after a profile edit.
    ///
    /// `None` signs out locally without contacting the server. Must be called
    /// from within a Tokio runtime.
    pub fn update_session(&self, session: Option<Session>) {
        self.apply(session);
    }

    pub fn state(&self) -> AuthState {
        self.inner.read().state.clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.inner.read().state.phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().state.is_authenticated()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.read().state.session.clone()
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Consecutive scheduled renewal failures, if a scheduler is running.
    pub fn refresh_failures(&self) -> Option<u32> {
        self.inner
            .read()
            .tasks
            .as_ref()
            .map(|tasks| tasks.scheduler.failure_count())
    }

    /// Whether automatic renewal stopped after too many failures.
    pub fn is_refresh_circuit_open(&self) -> bool {
        self.inner
            .read()
            .tasks
            .as_ref()
            .is_some_and(|tasks| tasks.scheduler.is_circuit_open())
    }

    /// Interval of the running scheduler.
    pub fn scheduler_interval(&self) -> Option<Duration> {
        self.inner
            .read()
            .tasks
            .as_ref()
            .map(|tasks| tasks.scheduler.interval())
    }

    pub fn is_refresh_in_flight(&self) -> bool {
        self.refresh_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Claim the single-flight flag.
    pub(crate) fn try_begin_refresh(&self) -> Option<RefreshGuard> {
        self.refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                flag: Arc::clone(&self.refresh_in_flight),
            })
    }

    /// Renew credentials, then re-fetch the identity and apply it if the
    /// session is still the one identified by `generation`.
    ///
    /// The caller must hold the single-flight guard.
    pub(crate) async fn renew_and_revalidate(&self, generation: u64) -> Result<RefreshOutcome> {
        self.api.refresh().await?;
        let session = self.api.current_session().await?;

        if self.apply_if_current(generation, session) {
            Ok(RefreshOutcome::Renewed)
        } else {
            debug!("Session changed during renewal, discarding result");
            Ok(RefreshOutcome::Stale)
        }
    }

    fn apply(&self, session: Option<Session>) {
        let cleared = {
            let mut inner = self.inner.write();
            self.transition(&mut inner, session)
        };
        if cleared {
            self.events.publish(SessionEvent::StateChanged);
        }
    }

    fn apply_if_current(&self, generation: u64, session: Session) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return false;
        }
        self.transition(&mut inner, Some(session));
        true
    }

    /// Clear the session identified by `generation`, recording `reason` if
    /// an authenticated session was actually cleared.
    fn clear_if_current(&self, generation: u64, reason: Option<&str>) -> bool {
        let cleared = {
            let mut inner = self.inner.write();
            if inner.generation != generation {
                return false;
            }
            self.clear(&mut inner, reason)
        };
        if cleared {
            self.events.publish(SessionEvent::StateChanged);
        }
        true
    }

    fn clear(&self, inner: &mut Inner, reason: Option<&str>) -> bool {
        let cleared = self.transition(inner, None);
        if cleared && let Some(reason) = reason {
            inner.state.last_error = Some(reason.to_string());
        }
        cleared
    }

    /// Install `session` and start or stop the session tasks accordingly.
    ///
    /// Returns true when an existing session was cleared.
    fn transition(&self, inner: &mut Inner, session: Option<Session>) -> bool {
        let was_authenticated = inner.state.is_authenticated();
        let authenticated = session.is_some();

        if authenticated {
            inner.state.last_error = None;
        }
        inner.state.session = session;
        inner.state.is_loading = false;

        match (was_authenticated, authenticated) {
            (false, true) => {
                inner.generation += 1;
                if let Some(tasks) = inner.tasks.take() {
                    tasks.stop();
                }
                inner.tasks = self.start_tasks(inner.generation);
                debug!(generation = inner.generation, "Entered authenticated state");
                false
            }
            (true, false) => {
                inner.generation += 1;
                if let Some(tasks) = inner.tasks.take() {
                    tasks.stop();
                }
                debug!(generation = inner.generation, "Left authenticated state");
                true
            }
            _ => false,
        }
    }

    fn start_tasks(&self, generation: u64) -> Option<SessionTasks> {
        if self.lifecycle.is_cancelled() {
            return None;
        }

        let scheduler =
            RefreshScheduler::start(self.this.clone(), generation, &self.config, &self.lifecycle);
        let monitor = self.visibility.as_ref().map(|signal| {
            VisibilityMonitor::start(
                self.this.clone(),
                generation,
                signal.subscribe(),
                &self.lifecycle,
            )
        });

        Some(SessionTasks { scheduler, monitor })
    }

    fn record_error(&self, message: String) {
        self.inner.write().state.last_error = Some(message);
    }

    /// Clear the session after the credentials became unrecoverable.
    fn expire(&self) {
        let cleared = {
            let mut inner = self.inner.write();
            self.clear(&mut inner, Some(SESSION_EXPIRED))
        };

        if cleared {
            info!("Session expired, cleared local session");
            self.events.publish(SessionEvent::StateChanged);
        }
    }

    fn listener_active(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && !self.lifecycle.is_cancelled()
    }

    fn spawn_expiry_listener(&self) {
        let mut receiver = self.events.subscribe();
        let cancel = self.lifecycle.child_token();
        let manager = self.this.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(SessionEvent::Expired) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if manager.take_own_expiry() {
                            continue;
                        }
                        manager.expire();
                    }
                    Ok(SessionEvent::StateChanged) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Expiry listener lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Expiry listener stopped");
        });
    }

    fn take_own_expiry(&self) -> bool {
        self.own_expiries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.lifecycle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAuthApi, Reply, expired_count, settle, test_session};
    use cafe_transport::StatusCode;
    use serde_json::json;

    fn manager(api: &Arc<FakeAuthApi>) -> Arc<SessionManager> {
        SessionManagerBuilder::new(api.clone(), SessionConfig::default()).build()
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        let mut events = manager.events().subscribe();
        manager.init().await;

        assert!(manager.login("998901234567").await);
        assert!(manager.is_authenticated());
        assert_eq!(manager.session().unwrap().phone_number, "998901234567");
        assert_eq!(manager.phase(), AuthPhase::Authenticated);

        manager.logout().await;
        settle().await;

        assert!(!manager.is_authenticated());
        assert_eq!(manager.phase(), AuthPhase::Anonymous);
        assert_eq!(api.logout_calls(), 1);
        assert_eq!(expired_count(&mut events), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_unreachable() {
        let api = Arc::new(FakeAuthApi::new());
        api.set_logout_reply(Reply::Network);
        let manager = manager(&api);
        let mut events = manager.events().subscribe();

        assert!(manager.login("998901234567").await);
        manager.logout().await;

        assert!(!manager.is_authenticated());
        assert_eq!(manager.scheduler_interval(), None);
        assert_eq!(expired_count(&mut events), 1);
    }

    #[tokio::test]
    async fn test_logout_without_session_skips_remote_call() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        let mut events = manager.events().subscribe();

        manager.logout().await;

        assert_eq!(api.logout_calls(), 0);
        assert_eq!(manager.phase(), AuthPhase::Anonymous);
        assert_eq!(expired_count(&mut events), 1);
    }

    #[tokio::test]
    async fn test_login_failure_messages() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);

        api.set_login_reply(Reply::Detail(
            StatusCode::NOT_FOUND,
            json!({"detail": "User not found"}),
        ));
        assert!(!manager.login("998900000000").await);
        assert_eq!(manager.state().last_error.as_deref(), Some("User not found"));

        api.set_login_reply(Reply::Detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"detail": [{"msg": "invalid phone"}, {"message": "too short"}, {}]}),
        ));
        assert!(!manager.login("1").await);
        assert_eq!(
            manager.state().last_error.as_deref(),
            Some("invalid phone, too short, Validation error")
        );

        api.set_login_reply(Reply::Network);
        assert!(!manager.login("998900000000").await);
        assert_eq!(manager.state().last_error.as_deref(), Some(LOGIN_FAILED));
        assert!(!manager.is_authenticated());

        api.set_login_reply(Reply::Ok);
        assert!(manager.login("998901234567").await);
        assert_eq!(manager.state().last_error, None);
    }

    #[tokio::test]
    async fn test_register() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        let data = RegisterData {
            username: "aziz".to_string(),
            name: Some("Aziz".to_string()),
            surname: None,
            phone_number: "998901234567".to_string(),
            provider: "phone".to_string(),
            provider_id: "998901234567".to_string(),
        };

        api.set_register_reply(Reply::Detail(
            StatusCode::BAD_REQUEST,
            json!({"detail": {"message": "Phone number already registered"}}),
        ));
        assert!(!manager.register(&data).await);
        assert_eq!(
            manager.state().last_error.as_deref(),
            Some("Phone number already registered")
        );

        api.set_register_reply(Reply::Detail(StatusCode::INTERNAL_SERVER_ERROR, json!({})));
        assert!(!manager.register(&data).await);
        assert_eq!(manager.state().last_error.as_deref(), Some(REGISTRATION_FAILED));

        api.set_register_reply(Reply::Ok);
        assert!(manager.register(&data).await);
        assert_eq!(manager.session().unwrap().name.as_deref(), Some("Aziz"));
        assert_eq!(api.register_calls(), 3);
    }

    #[tokio::test]
    async fn test_init_resolves_phase() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        assert_eq!(manager.phase(), AuthPhase::Unknown);

        manager.init().await;
        assert_eq!(manager.phase(), AuthPhase::Authenticated);
        assert!(manager.scheduler_interval().is_some());

        let api = Arc::new(FakeAuthApi::new());
        api.set_current_reply(Reply::Unauthorized);
        let manager = SessionManagerBuilder::new(api.clone(), SessionConfig::default()).build();
        manager.init().await;
        assert_eq!(manager.phase(), AuthPhase::Anonymous);
        assert_eq!(manager.scheduler_interval(), None);

        manager.init().await;
        assert_eq!(api.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_clears_session() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        let mut events = manager.events().subscribe();

        assert!(manager.login("998901234567").await);
        api.set_current_reply(Reply::Network);
        manager.validate_session().await;

        assert!(!manager.is_authenticated());
        assert_eq!(manager.scheduler_interval(), None);
        assert_eq!(manager.state().last_error, None);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::StateChanged);
    }

    #[tokio::test]
    async fn test_rejected_validation_reports_expiry() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        manager.init().await;
        assert!(manager.is_authenticated());

        api.set_current_reply(Reply::Unauthorized);
        manager.validate_session().await;
        assert_eq!(manager.state().last_error.as_deref(), Some(SESSION_EXPIRED));

        // The expiry signal that follows changes nothing.
        manager.events().publish(SessionEvent::Expired);
        settle().await;
        assert_eq!(manager.state().last_error.as_deref(), Some(SESSION_EXPIRED));
        assert_eq!(manager.phase(), AuthPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_rejected_startup_validation_is_not_an_expiry() {
        let api = Arc::new(FakeAuthApi::new());
        api.set_current_reply(Reply::Unauthorized);
        let manager = manager(&api);
        manager.init().await;

        assert_eq!(manager.phase(), AuthPhase::Anonymous);
        assert_eq!(manager.state().last_error, None);
    }

    #[tokio::test]
    async fn test_logout_after_expiry_clears_message() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        manager.init().await;

        manager.events().publish(SessionEvent::Expired);
        settle().await;
        assert_eq!(manager.state().last_error.as_deref(), Some(SESSION_EXPIRED));

        manager.logout().await;
        settle().await;
        assert_eq!(manager.state().last_error, None);
        assert_eq!(manager.phase(), AuthPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_stale_validation_is_discarded() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        assert!(manager.login("998901234567").await);

        let gate = api.gate_current();
        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.validate_session().await })
        };
        settle().await;

        manager.logout().await;
        gate.notify_one();
        pending.await.unwrap();

        assert!(!manager.is_authenticated());
        assert_eq!(manager.scheduler_interval(), None);
    }

    #[tokio::test]
    async fn test_external_expiry_clears_session() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        manager.init().await;
        assert!(manager.is_authenticated());

        manager.events().publish(SessionEvent::Expired);
        settle().await;

        let state = manager.state();
        assert!(!state.is_authenticated());
        assert_eq!(state.last_error.as_deref(), Some(SESSION_EXPIRED));
        assert_eq!(manager.scheduler_interval(), None);
    }

    #[tokio::test]
    async fn test_own_logout_signal_does_not_clear_next_login() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        manager.init().await;

        manager.logout().await;
        assert!(manager.login("998901234567").await);
        settle().await;

        assert!(manager.is_authenticated());
        assert_eq!(manager.state().last_error, None);
    }

    #[tokio::test]
    async fn test_refresh_session() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        assert!(manager.login("998901234567").await);

        assert_eq!(manager.refresh_session().await.unwrap(), RefreshOutcome::Renewed);
        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(api.current_calls(), 1);
        assert!(!manager.is_refresh_in_flight());

        api.push_refresh_reply(Reply::Unauthorized);
        let err = manager.refresh_session().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!manager.is_refresh_in_flight());
        // Manual failures are not counted against the scheduler.
        assert_eq!(manager.refresh_failures(), Some(0));
    }

    #[tokio::test]
    async fn test_refresh_skipped_while_in_flight() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        assert!(manager.login("998901234567").await);

        let gate = api.gate_refresh();
        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh_session().await })
        };
        settle().await;
        assert!(manager.is_refresh_in_flight());

        assert_eq!(manager.refresh_session().await.unwrap(), RefreshOutcome::Skipped);

        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), RefreshOutcome::Renewed);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_while_anonymous_installs_session() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);

        assert_eq!(manager.refresh_session().await.unwrap(), RefreshOutcome::Renewed);
        assert!(manager.is_authenticated());
        assert!(manager.scheduler_interval().is_some());
    }

    #[tokio::test]
    async fn test_update_session() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        let mut events = manager.events().subscribe();

        manager.update_session(Some(test_session("998901234567")));
        assert!(manager.is_authenticated());
        let interval = manager.scheduler_interval();
        assert!(interval.is_some());

        let mut edited = test_session("998901234567");
        edited.name = Some("Bobur".to_string());
        manager.update_session(Some(edited));
        assert_eq!(manager.session().unwrap().name.as_deref(), Some("Bobur"));
        assert_eq!(manager.scheduler_interval(), interval);

        manager.update_session(None);
        assert!(!manager.is_authenticated());
        assert_eq!(api.logout_calls(), 0);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::StateChanged);
    }

    #[tokio::test]
    async fn test_teardown() {
        let api = Arc::new(FakeAuthApi::new());
        let manager = manager(&api);
        manager.init().await;
        assert!(manager.scheduler_interval().is_some());

        manager.teardown();
        manager.teardown();
        assert_eq!(manager.scheduler_interval(), None);

        // Expiry listener is gone.
        manager.events().publish(SessionEvent::Expired);
        settle().await;
        assert!(manager.is_authenticated());

        manager.logout().await;
        assert!(manager.login("998901234567").await);
        assert_eq!(manager.scheduler_interval(), None);
    }
}
