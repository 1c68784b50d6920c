//! Session lifecycle.

mod manager;
mod state;

pub use manager::{RefreshOutcome, SessionManager, SessionManagerBuilder};
pub use state::{AuthPhase, AuthState};
