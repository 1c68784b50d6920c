//! Session signals.
//!
//! Signals are broadcast when the session changes in ways that independent
//! collaborators (badges, carts, login prompts) need to react to.

use tokio::sync::broadcast;

/// Signals broadcast on the session bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// Credentials became unrecoverable, or the user logged out.
    Expired,
    /// Something derived from the session should be reloaded.
    StateChanged,
}

impl SessionEvent {
    /// Stable signal name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Expired => "session_expired",
            Self::StateChanged => "state_changed",
        }
    }
}

/// Default channel capacity for session events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for session events.
///
/// Cloning shares the underlying channel. Subscribers unsubscribe by dropping
/// their receiver.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish a session event.
    ///
    /// Returns the number of receivers that received the event, 0 when
    /// nobody is listening.
    pub fn publish(&self, event: SessionEvent) -> usize {
        tracing::debug!(signal = event.name(), "Publishing session event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}
