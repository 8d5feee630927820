//! Blocking reqwest client for `getUpdates`.

use log::debug;
use reqwest::blocking::Client;

use crate::error::{FetchError, NotifierError, NotifierResult, TransportError};
use crate::event::Event;
use crate::source::UpdateSource;

use super::{decode_updates, read_limited, HttpSourceConfig};

/// [`UpdateSource`] backed by the bot API's `getUpdates` endpoint.
///
/// Requests `GET {base_url}/bot{token}/getUpdates?offset={from}`. Error
/// messages never include the request URL, which carries the token.
#[derive(Debug)]
pub struct HttpUpdateSource {
    cfg: HttpSourceConfig,
    client: Client,
    url: String,
}

impl HttpUpdateSource {
    /// Builds the HTTP client. Must not be called from inside an async runtime.
    pub fn new(cfg: HttpSourceConfig) -> NotifierResult<Self> {
        cfg.validate()?;
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| NotifierError::internal(format!("failed to build HTTP client: {}", e.without_url())))?;
        let url = cfg.updates_url();
        Ok(Self { cfg, client, url })
    }

    /// The configuration this source was built with.
    #[must_use]
    pub const fn config(&self) -> &HttpSourceConfig {
        &self.cfg
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.cfg.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                duration_ms: self.timeout_ms(),
            }
        } else {
            TransportError::ConnectionFailed {
                message: err.without_url().to_string(),
            }
        }
    }
}

impl UpdateSource for HttpUpdateSource {
    fn fetch_events(&self, from_sequence_id: u64) -> Result<Vec<Event>, FetchError> {
        let response = self
            .client
            .get(format!("{}?offset={from_sequence_id}", self.url))
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let declared = response.content_length();
        let body = read_limited(response, declared, self.cfg.max_response_bytes).map_err(|e| match e {
            TransportError::Timeout { .. } => TransportError::Timeout {
                duration_ms: self.timeout_ms(),
            },
            other => other,
        })?;
        debug!("getUpdates offset={from_sequence_id} status={status} bytes={}", body.len());

        decode_updates(status, &body)
    }
}
