use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Fallback text for a field error that carries neither `msg` nor `message`.
const GENERIC_FIELD_ERROR: &str = "Validation error";

#[derive(Debug, Error)]
pub enum TransportError {
    /// No response was received (connection refused, timeout, DNS...).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("http error {status}: {detail}")]
    Http { status: StatusCode, detail: ErrorDetail },

    /// The server rejected the request with a list of per-field errors.
    #[error("validation error {status}: {}", join_field_errors(.errors))]
    Validation {
        status: StatusCode,
        errors: Vec<FieldError>,
    },

    /// A success response whose body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("transport configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Build an error from a non-success response.
    ///
    /// The `detail` member of a JSON body decides the variant: an array becomes
    /// [`TransportError::Validation`], anything else is kept as an [`ErrorDetail`].
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|mut value| value.get_mut("detail").map(Value::take));

        match detail {
            Some(Value::Array(items)) => Self::Validation {
                status,
                errors: items.into_iter().map(FieldError::from_value).collect(),
            },
            Some(Value::String(message)) if !message.is_empty() => Self::Http {
                status,
                detail: ErrorDetail::Message(message),
            },
            Some(Value::Object(map)) => Self::Http {
                status,
                detail: ErrorDetail::Object {
                    msg: string_field(&map, "msg"),
                    message: string_field(&map, "message"),
                },
            },
            _ => Self::Http {
                status,
                detail: ErrorDetail::Empty,
            },
        }
    }

    /// HTTP status of the failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } | Self::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the server rejected the credentials.
    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Collapse the failure into one message suitable for display.
    ///
    /// `fallback` is used when the server gave nothing better (no detail,
    /// network failures, decode errors).
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Http { detail, .. } => detail
                .text()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
            Self::Validation { errors, .. } if !errors.is_empty() => join_field_errors(errors),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// The `detail` member of an error body, when it is not a field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// Body had no usable `detail`.
    Empty,
    /// `"detail": "..."`
    Message(String),
    /// `"detail": {"msg": ..., "message": ...}`
    Object {
        msg: Option<String>,
        message: Option<String>,
    },
}

impl ErrorDetail {
    /// The displayable text, preferring `msg` over `message` for objects.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Message(message) => Some(message),
            Self::Object { msg, message } => msg.as_deref().or(message.as_deref()),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text().unwrap_or("no detail"))
    }
}

/// One entry of a validation error list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<Value>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FieldError {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self {
                message: Some(message),
                ..Self::default()
            },
            other => serde_json::from_value(other).unwrap_or_default(),
        }
    }

    pub fn text(&self) -> &str {
        self.msg
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or(GENERIC_FIELD_ERROR)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::text)
        .collect::<Vec<_>>()
        .join(", ")
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}
