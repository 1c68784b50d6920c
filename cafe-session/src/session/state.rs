use std::fmt;

use crate::api::Session;

/// Snapshot of the authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    /// True until the first validation has completed.
    pub is_loading: bool,
    /// User-facing message from the last failed login or registration.
    pub last_error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            is_loading: true,
            last_error: None,
        }
    }
}

impl AuthState {
    /// Derived strictly from the presence of a session.
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        match (&self.session, self.is_loading) {
            (Some(_), _) => AuthPhase::Authenticated,
            (None, true) => AuthPhase::Unknown,
            (None, false) => AuthPhase::Anonymous,
        }
    }
}

/// Lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    /// Before the first validation completes.
    Unknown,
    Anonymous,
    Authenticated,
}

impl AuthPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Anonymous => "anonymous",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
