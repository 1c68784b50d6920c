//! # cafe-session
//!
//! Session lifecycle for the cafe API client.
//!
//! [`SessionManager`] owns the user's identity and exposes login,
//! registration, logout, validation and forced renewal. While a session is
//! authenticated it runs a [`RefreshScheduler`] that renews the credentials
//! ahead of expiry, and optionally a [`VisibilityMonitor`] that re-validates
//! the session when the application returns to the foreground.
//!
//! Credentials are never held here; they live in the transport's cookie
//! store (see [`cafe_transport`]).

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod visibility;

#[cfg(test)]
mod testing;

pub use api::{AuthApi, HttpAuthApi, RegisterData, Session};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use scheduler::RefreshScheduler;
pub use session::{AuthPhase, AuthState, RefreshOutcome, SessionManager, SessionManagerBuilder};
pub use visibility::{Visibility, VisibilityMonitor, VisibilitySignal};

pub use cafe_transport::{SessionEvent, SessionEventBus};
