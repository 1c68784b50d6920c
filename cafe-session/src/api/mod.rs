//! Remote identity API.
//!
//! [`AuthApi`] is the seam between the session manager and the server.
//! [`HttpAuthApi`] implements it on top of the cookie-credentialed transport.

mod http;
mod models;

pub use http::HttpAuthApi;
pub use models::{RegisterData, RegisterResponse, Session};

use async_trait::async_trait;
use cafe_transport::TransportError;

/// Remote operations on the user's identity.
///
/// Credentials are never passed in or returned: they travel as cookies inside
/// the transport.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an account. The server also sets credentials.
    async fn register(&self, data: &RegisterData) -> Result<Session, TransportError>;

    /// Log in by phone number.
    async fn login(&self, phone_number: &str) -> Result<Session, TransportError>;

    /// Renew the access credential using the refresh credential.
    async fn refresh(&self) -> Result<(), TransportError>;

    /// Fetch the identity the current credentials belong to.
    async fn current_session(&self) -> Result<Session, TransportError>;

    /// Invalidate the credentials server-side.
    async fn logout(&self, user_id: i64) -> Result<(), TransportError>;
}
