//! Backend client: one POST to the Ark chat completions endpoint per request.
//!
//! The outcome is classified into [`BackendOutcome`]. For streamed requests the
//! response body is handed over unread, so the connection stays open until the
//! relay drops it.

use std::io;
use std::pin::Pin;

use arkgate_core::{BackendConfig, BackendPayload, Credential};
use futures_util::TryStreamExt;
use reqwest::{Client, header};
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Open, not yet consumed backend response body.
pub type BackendStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// Why a backend call did not produce a usable response.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The payload could not be encoded. No request was sent.
    #[error("marshal payload failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Connect, DNS, TLS, timeout or any other transport failure.
    #[error("backend request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a status of 400 or above.
    #[error("backend error ({status}): {body}")]
    Status { status: u16, body: String },

    /// A buffered response body was not valid JSON.
    #[error("decode response failed: {0}")]
    Decode(#[source] serde_json::Error),
}

impl BackendError {
    /// HTTP status returned by the backend, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened on our side rather than the backend's.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Serialize(_) | Self::Decode(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

/// Result of one backend call.
pub enum BackendOutcome {
    /// Non-streamed success, fully decoded. The connection is already released.
    Buffered(Value),
    /// Streamed success. Whoever holds the stream owns the connection.
    Streaming(BackendStream),
    /// Any failure, local or remote.
    Failed(BackendError),
}

impl std::fmt::Debug for BackendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(doc) => f.debug_tuple("Buffered").field(doc).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// HTTP client bound to one backend endpoint.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    endpoint: String,
}

impl BackendClient {
    /// Build a client whose timeout bounds the entire exchange, including
    /// reading a streamed body.
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.chat_completions_url(),
        })
    }

    /// Full URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a translated payload with the caller's credential.
    ///
    /// Whether the response is buffered or streamed follows the payload's
    /// `stream` flag.
    pub async fn send(&self, credential: &Credential, payload: &BackendPayload) -> BackendOutcome {
        let body = match payload.to_vec() {
            Ok(body) => body,
            Err(e) => return BackendOutcome::Failed(BackendError::Serialize(e)),
        };
        let stream = payload.stream();

        debug!(upstream = %self.endpoint, stream, bytes = body.len(), "Forwarding to backend");

        let response = match self
            .http
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(credential.expose())
            .body(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return BackendOutcome::Failed(BackendError::Transport(e)),
        };

        let status = response.status();

        // Read error bodies fully so the connection is not left dangling.
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return BackendOutcome::Failed(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if stream {
            let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
            return BackendOutcome::Streaming(Box::pin(reader));
        }

        match response.bytes().await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(doc) => BackendOutcome::Buffered(doc),
                Err(e) => BackendOutcome::Failed(BackendError::Decode(e)),
            },
            Err(e) => BackendOutcome::Failed(BackendError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn endpoint_is_built_from_base_url() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:1/api/v3/".to_string(),
            timeout: Duration::from_secs(1),
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1/api/v3/chat/completions");
    }

    #[test]
    fn status_errors_carry_status_and_body() {
        let err = BackendError::Status {
            status: 503,
            body: r#"{"msg":"overloaded"}"#.to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_internal());
        assert_eq!(err.to_string(), r#"backend error (503): {"msg":"overloaded"}"#);
    }

    #[test]
    fn decode_errors_are_internal() {
        let err = serde_json::from_slice::<Value>(b"nope").unwrap_err();
        let err = BackendError::Decode(err);
        assert!(err.is_internal());
        assert_eq!(err.status(), None);
    }
}
