//! Foreground re-validation.
//!
//! The host application reports foreground/background transitions through a
//! [`VisibilitySignal`]. While a session is authenticated, each return to the
//! foreground triggers one identity check. It never renews credentials and
//! never touches the renewal failure counter.

use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::SessionManager;

const SIGNAL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Foreground,
    Background,
}

/// Sender side of the visibility transitions.
///
/// Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct VisibilitySignal {
    sender: broadcast::Sender<Visibility>,
}

impl VisibilitySignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }

    /// Report a transition. Returns the number of monitors reached.
    pub fn notify(&self, visibility: Visibility) -> usize {
        self.sender.send(visibility).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Visibility> {
        self.sender.subscribe()
    }
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for foreground transitions on behalf of one authenticated session.
pub struct VisibilityMonitor {
    cancel: CancellationToken,
}

impl VisibilityMonitor {
    pub(crate) fn start(
        manager: Weak<SessionManager>,
        generation: u64,
        mut receiver: broadcast::Receiver<Visibility>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                let visibility = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    visibility = receiver.recv() => visibility,
                };

                match visibility {
                    Ok(Visibility::Foreground) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if !manager.is_current(generation) {
                            break;
                        }
                        if manager.is_authenticated() {
                            debug!("Application in foreground, validating session");
                            manager.validate_session().await;
                        }
                    }
                    Ok(Visibility::Background) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Visibility monitor lagged behind transitions");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(generation, "Visibility monitor stopped");
        });

        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for VisibilityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
