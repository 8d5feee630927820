//! HTTP transport for the bot API's `getUpdates` endpoint.
//!
//! The wire handling (response envelope, API error bodies, size limits) lives
//! here and is independent of the HTTP client. The blocking client itself is
//! behind the `http` feature.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::error::{FetchError, TransportError, ValidationError};
use crate::event::Event;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpUpdateSource;

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

/// Public bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Maximum accepted response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 100_000;

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable holding the bot token.
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable overriding the API base URL.
pub const ENV_API_URL: &str = "TELEGRAM_API_URL";

/// Configuration for the HTTP update source.
#[derive(Clone)]
pub struct HttpSourceConfig {
    /// Scheme and host of the API, without trailing path.
    pub base_url: String,
    /// Bot token, embedded in the request path.
    pub token: String,
    /// Timeout for a whole request including the body.
    pub request_timeout: Duration,
    /// Responses larger than this are rejected.
    pub max_response_bytes: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

// The token grants full control of the bot; keep it out of logs.
impl fmt::Debug for HttpSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSourceConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

impl HttpSourceConfig {
    /// Default configuration for the given bot token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Reads `TELEGRAM_BOT_TOKEN` (required) and `TELEGRAM_API_URL` (optional).
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let token = lookup(ENV_BOT_TOKEN)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ValidationError::MissingField {
                field: ENV_BOT_TOKEN.to_string(),
            })?;

        let mut cfg = Self::with_token(token);
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            cfg.base_url = url.trim().to_string();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that a request can be built from this configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingField {
                field: "token".to_string(),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidConfig {
                field: "base_url".to_string(),
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig {
                field: "request_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_response_bytes == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "max_response_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Full `getUpdates` URL, without query string.
    #[must_use]
    pub fn updates_url(&self) -> String {
        format!("{}/bot{}/getUpdates", self.base_url.trim_end_matches('/'), self.token)
    }
}

// ----------------------------------------------------------------------------
// Wire handling
// ----------------------------------------------------------------------------

/// `{ok, result}` on success, `{ok: false, error_code, description}` on failure.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

/// Reads at most `limit` bytes, failing if the body is, or declares to be, larger.
pub(crate) fn read_limited(reader: impl Read, declared: Option<u64>, limit: u64) -> Result<Vec<u8>, TransportError> {
    if let Some(size) = declared {
        if size > limit {
            return Err(TransportError::ResponseTooLarge { size, limit });
        }
    }

    let mut body = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout { duration_ms: 0 },
            _ => TransportError::ConnectionFailed {
                message: format!("failed to read response body: {e}"),
            },
        })?;

    let size = body.len() as u64;
    if size > limit {
        return Err(TransportError::ResponseTooLarge { size, limit });
    }
    Ok(body)
}

/// Decodes a `getUpdates` response body.
pub(crate) fn decode_updates(status: u16, body: &[u8]) -> Result<Vec<Event>, FetchError> {
    if status != 200 {
        return Err(rejection(status, body));
    }

    let envelope: ApiEnvelope<Vec<Event>> =
        serde_json::from_slice(body).map_err(|e| TransportError::MalformedResponse {
            message: format!("invalid getUpdates body: {e}"),
        })?;

    if !envelope.ok {
        return Err(FetchError::RemoteRejected {
            code: envelope.error_code.unwrap_or(i64::from(status)),
            description: envelope.description.unwrap_or_default(),
        });
    }

    envelope.result.ok_or_else(|| {
        TransportError::MalformedResponse {
            message: "getUpdates body has no result".to_string(),
        }
        .into()
    })
}

/// Builds a rejection from a non-200 response, preferring the API error body.
fn rejection(status: u16, body: &[u8]) -> FetchError {
    match serde_json::from_slice::<ApiEnvelope<IgnoredAny>>(body) {
        Ok(envelope) => FetchError::RemoteRejected {
            code: envelope.error_code.unwrap_or(i64::from(status)),
            description: envelope
                .description
                .unwrap_or_else(|| format!("HTTP status {status}")),
        },
        Err(_) => FetchError::RemoteRejected {
            code: i64::from(status),
            description: format!("HTTP status {status} with unparseable body"),
        },
    }
}
