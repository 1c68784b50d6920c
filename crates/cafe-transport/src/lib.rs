//! # cafe-transport
//!
//! HTTP transport for a cookie-credentialed API.
//!
//! Credentials are never visible to callers: the access and refresh tokens
//! are HTTP-only cookies kept in the client's cookie store. When a request is
//! rejected with 401 the client renews the credentials once and resubmits the
//! request. When renewal is impossible it publishes
//! [`SessionEvent::Expired`] on its [`SessionEventBus`].

mod client;
mod error;
mod events;
mod request;

pub use client::{
    DEFAULT_REFRESH_PATH, DEFAULT_REQUEST_TIMEOUT, TransportClient, TransportConfig,
    install_rustls_provider,
};
pub use error::{ErrorDetail, FieldError, TransportError};
pub use events::{SessionEvent, SessionEventBus};
pub use request::{ApiRequest, ApiResponse};

pub use reqwest::{Method, StatusCode};
