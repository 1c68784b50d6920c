//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use cafe_transport::{DEFAULT_REQUEST_TIMEOUT, TransportConfig};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Access-token lifetime, minutes.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_MINS: u64 = 15;

/// How long before expiry to renew, minutes.
pub const DEFAULT_REFRESH_BEFORE_EXPIRY_MINS: u64 = 1;

/// Consecutive scheduled renewal failures before automatic renewal stops.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Lower bound for a derived renewal interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Configuration for the session subsystem.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub access_token_lifetime_mins: u64,
    pub refresh_before_expiry_mins: u64,
    /// Explicit renewal interval in minutes; 0 derives it from the lifetime.
    pub refresh_interval_override_mins: u64,
    pub failure_threshold: u32,
    pub request_timeout: Duration,
    /// Development mode logs every scheduled renewal at info.
    pub is_development: bool,
    pub debug_mode: bool,
    /// Directory for the rolling log file. Console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token_lifetime_mins: DEFAULT_ACCESS_TOKEN_LIFETIME_MINS,
            refresh_before_expiry_mins: DEFAULT_REFRESH_BEFORE_EXPIRY_MINS,
            refresh_interval_override_mins: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            is_development: true,
            debug_mode: false,
            log_dir: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from `CAFE_*` environment variables.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are ignored and unparseable numbers keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(base_url) = var("CAFE_API_BASE_URL") {
            config.api_base_url = base_url;
        }

        if let Some(lifetime) = var("CAFE_ACCESS_TOKEN_LIFETIME")
            && let Ok(parsed) = lifetime.parse::<u64>()
        {
            config.access_token_lifetime_mins = parsed;
        }

        if let Some(buffer) = var("CAFE_TOKEN_REFRESH_BEFORE_EXPIRY")
            && let Ok(parsed) = buffer.parse::<u64>()
        {
            config.refresh_before_expiry_mins = parsed;
        }

        if let Some(interval) = var("CAFE_TOKEN_REFRESH_INTERVAL")
            && let Ok(parsed) = interval.parse::<u64>()
        {
            config.refresh_interval_override_mins = parsed;
        }

        if let Some(threshold) = var("CAFE_REFRESH_FAILURE_THRESHOLD")
            && let Ok(parsed) = threshold.parse::<u32>()
            && parsed > 0
        {
            config.failure_threshold = parsed;
        }

        if let Some(timeout) = var("CAFE_REQUEST_TIMEOUT_SECS")
            && let Ok(parsed) = timeout.parse::<u64>()
        {
            config.request_timeout = Duration::from_secs(parsed);
        }

        if let Some(env) = var("CAFE_ENV") {
            config.is_development = env.eq_ignore_ascii_case("development");
        }

        if let Some(debug) = var("CAFE_DEBUG_MODE") {
            config.debug_mode = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        config.log_dir = var("CAFE_LOG_DIR").map(PathBuf::from);

        config
    }

    /// The interval between scheduled renewals.
    ///
    /// An explicit override is used as-is; otherwise the interval is derived
    /// from the token lifetime minus the renewal buffer.
    pub fn refresh_interval(&self) -> Duration {
        if self.refresh_interval_override_mins > 0 {
            return minutes(self.refresh_interval_override_mins);
        }
        compute_refresh_interval(
            self.access_token_lifetime_mins,
            self.refresh_before_expiry_mins,
        )
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.api_base_url.clone()).with_timeout(self.request_timeout)
    }
}

/// `lifetime - buffer`, floored at [`MIN_REFRESH_INTERVAL`].
pub fn compute_refresh_interval(lifetime_mins: u64, buffer_mins: u64) -> Duration {
    minutes(lifetime_mins.saturating_sub(buffer_mins)).max(MIN_REFRESH_INTERVAL)
}

fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}
