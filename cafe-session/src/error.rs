//! Error types for the session crate.

use cafe_transport::TransportError;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Check if the remote side rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_unauthorized())
    }
}
