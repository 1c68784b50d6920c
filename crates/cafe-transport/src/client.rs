use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::events::{SessionEvent, SessionEventBus};
use crate::request::{ApiRequest, ApiResponse};
use crate::TransportError;

/// Renewal endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/tokens/refresh-access";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Settings for [`TransportClient`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API root, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// Path of the credential renewal endpoint.
    pub refresh_path: String,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for a cookie-credentialed API.
///
/// Access and refresh tokens live only in the client's cookie store. A 401 on
/// any endpoint except the renewal endpoint triggers exactly one renewal and
/// one resubmission of the original request. Unrecoverable credentials are
/// announced with [`SessionEvent::Expired`].
///
/// The credential epoch identifies the session the cookies belong to. It is
/// advanced with [`TransportClient::advance_epoch`] whenever a login,
/// registration or logout replaces the cookies. A 401 answering a request
/// sent under an older epoch is returned as-is: it never triggers a renewal
/// and never announces expiry.
pub struct TransportClient {
    http: reqwest::Client,
    base_url: String,
    refresh_path: String,
    events: SessionEventBus,
    epoch: AtomicU64,
    /// Successful renewals so far. Lets a caller that waited on the lock see
    /// that someone else already renewed.
    renewals: AtomicU64,
    /// Held for the duration of a renewal call so two are never outstanding.
    renew_lock: Mutex<()>,
}

impl TransportClient {
    pub fn new(config: &TransportConfig, events: SessionEventBus) -> Result<Self, TransportError> {
        install_rustls_provider();

        let base_url = Url::parse(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers);
        if config.timeout > Duration::ZERO {
            builder = builder.timeout(config.timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            refresh_path: normalize_path(&config.refresh_path),
            events,
            epoch: AtomicU64::new(0),
            renewals: AtomicU64::new(0),
            renew_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Epoch of the credentials currently in the cookie store.
    pub fn credential_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Mark the stored credentials as replaced. Returns the new epoch.
    pub fn advance_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, "Credential epoch advanced");
        epoch
    }

    /// Check if a request targets the renewal endpoint.
    pub fn is_renewal(&self, request: &ApiRequest) -> bool {
        normalize_path(request.path()) == self.refresh_path
    }

    /// Send a request, transparently recovering from one expired access token.
    ///
    /// Requests to the renewal endpoint are serialized with [`Self::renew`]
    /// and are never retried.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let epoch = self.credential_epoch();

        if self.is_renewal(&request) {
            let _guard = self.renew_lock.lock().await;
            return self.execute_renewal(&request, epoch).await;
        }

        let renewals = self.renewals.load(Ordering::SeqCst);
        let err = match self.execute(&request).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_unauthorized() => err,
            Err(err) => return Err(err),
        };

        if self.credential_epoch() != epoch {
            debug!(path = %request.path(), "Credentials replaced while request was in flight");
            return Err(err);
        }

        if request.is_retried() {
            warn!(path = %request.path(), "Request still unauthorized after renewal");
            self.expire_if_current(epoch);
            return Err(err);
        }

        debug!(path = %request.path(), "Unauthorized response, renewing credentials");
        if let Err(renew_err) = self.renew_after(renewals, epoch).await {
            if !renew_err.is_unauthorized() {
                warn!(error = %renew_err, "Credential renewal failed, returning original failure");
            }
            return Err(err);
        }

        let retry = request.into_retry();
        match self.execute(&retry).await {
            Ok(response) => {
                debug!(path = %retry.path(), "Request succeeded after renewal");
                Ok(response)
            }
            Err(retry_err) if retry_err.is_unauthorized() => {
                warn!(path = %retry.path(), "Request still unauthorized after renewal");
                self.expire_if_current(epoch);
                Err(retry_err)
            }
            Err(retry_err) => Err(retry_err),
        }
    }

    /// Call the renewal endpoint.
    ///
    /// Renewals are serialized. A caller that had to wait for another
    /// renewal to finish reuses its result instead of renewing again.
    pub async fn renew(&self) -> Result<(), TransportError> {
        let renewals = self.renewals.load(Ordering::SeqCst);
        self.renew_after(renewals, self.credential_epoch()).await
    }

    async fn renew_after(&self, renewals: u64, epoch: u64) -> Result<(), TransportError> {
        let _guard = self.renew_lock.lock().await;

        if self.renewals.load(Ordering::SeqCst) != renewals {
            debug!("Credentials were renewed while waiting, skipping renewal");
            return Ok(());
        }

        let request = ApiRequest::post(self.refresh_path.clone());
        self.execute_renewal(&request, epoch).await.map(|_| ())
    }

    /// Execute a renewal request. The caller must hold `renew_lock`.
    async fn execute_renewal(
        &self,
        request: &ApiRequest,
        epoch: u64,
    ) -> Result<ApiResponse, TransportError> {
        match self.execute(request).await {
            Ok(response) => {
                self.renewals.fetch_add(1, Ordering::SeqCst);
                debug!("Credentials renewed");
                Ok(response)
            }
            Err(err) => {
                if err.is_unauthorized() {
                    warn!("Renewal endpoint rejected the refresh credential");
                    self.expire_if_current(epoch);
                }
                Err(err)
            }
        }
    }

    /// Announce expiry, unless the rejected credentials were already replaced.
    fn expire_if_current(&self, epoch: u64) {
        if self.credential_epoch() != epoch {
            debug!(epoch, "Ignoring rejection of superseded credentials");
            return;
        }
        info!("Session credentials are no longer valid");
        self.events.publish(SessionEvent::Expired);
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        if path.contains(['?', '#']) {
            return Err(TransportError::Configuration(format!(
                "request path must not carry a query or fragment, use ApiRequest::query: {path}"
            )));
        }
        let url = format!("{}{}", self.base_url, normalize_path(path));
        Ok(Url::parse(&url)?)
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request.path())?;

        let mut builder = self.http.request(request.method().clone(), url);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method(),
            path = %request.path(),
            retried = request.is_retried(),
            "Sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            Ok(ApiResponse::new(status, body))
        } else {
            debug!(%status, path = %request.path(), "Request failed");
            Err(TransportError::from_response(status, &body))
        }
    }
}

/// Leading slash, no trailing slash.
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}
