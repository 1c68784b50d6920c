//! Test doubles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cafe_transport::{SessionEvent, StatusCode, TransportError};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};

use crate::api::{AuthApi, RegisterData, Session};

/// Scripted result of one fake call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ok,
    Unauthorized,
    Network,
    Detail(StatusCode, Value),
}

impl Reply {
    fn into_result(self) -> Result<(), TransportError> {
        match self {
            Self::Ok => Ok(()),
            Self::Unauthorized => Err(TransportError::from_response(
                StatusCode::UNAUTHORIZED,
                json!({"detail": "Not authenticated"}).to_string().as_bytes(),
            )),
            Self::Network => Err(TransportError::Network("connection refused".to_string())),
            Self::Detail(status, body) => Err(TransportError::from_response(
                status,
                body.to_string().as_bytes(),
            )),
        }
    }
}

pub(crate) fn test_session(phone_number: &str) -> Session {
    Session {
        id: 42,
        name: None,
        surname: None,
        phone_number: phone_number.to_string(),
        created_at: "2024-05-01T10:00:00".to_string(),
    }
}

/// In-memory [`AuthApi`] with call counters and scripted replies.
pub(crate) struct FakeAuthApi {
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    current_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    login_reply: Mutex<Reply>,
    register_reply: Mutex<Reply>,
    current_reply: Mutex<Reply>,
    logout_reply: Mutex<Reply>,
    refresh_replies: Mutex<VecDeque<Reply>>,
    refresh_default: Mutex<Reply>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    current_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeAuthApi {
    pub(crate) fn new() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            current_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            login_reply: Mutex::new(Reply::Ok),
            register_reply: Mutex::new(Reply::Ok),
            current_reply: Mutex::new(Reply::Ok),
            logout_reply: Mutex::new(Reply::Ok),
            refresh_replies: Mutex::new(VecDeque::new()),
            refresh_default: Mutex::new(Reply::Ok),
            refresh_gate: Mutex::new(None),
            current_gate: Mutex::new(None),
        }
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_login_reply(&self, reply: Reply) {
        *self.login_reply.lock() = reply;
    }

    pub(crate) fn set_register_reply(&self, reply: Reply) {
        *self.register_reply.lock() = reply;
    }

    pub(crate) fn set_current_reply(&self, reply: Reply) {
        *self.current_reply.lock() = reply;
    }

    pub(crate) fn set_logout_reply(&self, reply: Reply) {
        *self.logout_reply.lock() = reply;
    }

    /// Queue a reply for the next renewal; the default applies once drained.
    pub(crate) fn push_refresh_reply(&self, reply: Reply) {
        self.refresh_replies.lock().push_back(reply);
    }

    pub(crate) fn set_refresh_default(&self, reply: Reply) {
        *self.refresh_default.lock() = reply;
    }

    /// Hold renewal calls until the returned gate is notified.
    pub(crate) fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold identity checks until the returned gate is notified.
    pub(crate) fn gate_current(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.current_gate.lock() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn register(&self, data: &RegisterData) -> Result<Session, TransportError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.register_reply.lock().clone();
        reply.into_result()?;

        let mut session = test_session(&data.phone_number);
        session.name = data.name.clone();
        session.surname = data.surname.clone();
        Ok(session)
    }

    async fn login(&self, phone_number: &str) -> Result<Session, TransportError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.login_reply.lock().clone();
        reply.into_result()?;
        Ok(test_session(phone_number))
    }

    async fn refresh(&self) -> Result<(), TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let queued = self.refresh_replies.lock().pop_front();
        let reply = queued.unwrap_or_else(|| self.refresh_default.lock().clone());
        reply.into_result()
    }

    async fn current_session(&self) -> Result<Session, TransportError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.current_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.current_reply.lock().clone();
        reply.into_result()?;
        Ok(test_session("998901234567"))
    }

    async fn logout(&self, _user_id: i64) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.logout_reply.lock().clone();
        reply.into_result()
    }
}

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Drain `receiver` and count the expiry signals in it.
pub(crate) fn expired_count(receiver: &mut broadcast::Receiver<SessionEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = receiver.try_recv() {
        if event == SessionEvent::Expired {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_queue_then_default() {
        let api = FakeAuthApi::new();
        api.push_refresh_reply(Reply::Network);
        api.set_refresh_default(Reply::Unauthorized);

        assert!(matches!(api.refresh().await, Err(TransportError::Network(_))));
        assert!(api.refresh().await.unwrap_err().is_unauthorized());
        assert_eq!(api.refresh_calls(), 2);
        assert_eq!(api.login_calls(), 0);
    }
}
