use std::sync::Arc;

use async_trait::async_trait;
use cafe_transport::{ApiRequest, TransportClient, TransportError};
use tracing::debug;

use super::{AuthApi, RegisterData, RegisterResponse, Session};

const REGISTER_PATH: &str = "/users/register";
const LOGIN_PATH: &str = "/users/log-in";
const CURRENT_USER_PATH: &str = "/users/me";

/// [`AuthApi`] over HTTP.
///
/// Advances the transport's credential epoch whenever the cookies change
/// hands, so failures of requests sent under the previous identity are not
/// mistaken for expiry of the new one.
pub struct HttpAuthApi {
    transport: Arc<TransportClient>,
}

impl HttpAuthApi {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register(&self, data: &RegisterData) -> Result<Session, TransportError> {
        debug!(username = %data.username, "Registering user");
        let request = ApiRequest::post(REGISTER_PATH).json(data)?;
        let response = self.transport.send(request).await?;
        self.transport.advance_epoch();
        let registered: RegisterResponse = response.json()?;
        Ok(registered.user)
    }

    async fn login(&self, phone_number: &str) -> Result<Session, TransportError> {
        let request = ApiRequest::post(LOGIN_PATH).query("phone_number", phone_number);
        let response = self.transport.send(request).await?;
        self.transport.advance_epoch();
        response.json()
    }

    async fn refresh(&self) -> Result<(), TransportError> {
        self.transport.renew().await
    }

    async fn current_session(&self) -> Result<Session, TransportError> {
        self.transport
            .send(ApiRequest::get(CURRENT_USER_PATH))
            .await?
            .json()
    }

    async fn logout(&self, user_id: i64) -> Result<(), TransportError> {
        let result = self
            .transport
            .send(ApiRequest::post(format!("/users/{user_id}/logout")))
            .await;
        // Local credentials are discarded whatever the server said.
        self.transport.advance_epoch();
        result.map(|_| ())
    }
}
