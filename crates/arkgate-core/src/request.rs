//! Inbound chat completion request parsing.
//!
//! The body is read twice: once into [`ChatRequest`] for the three core
//! fields, and once as a generic JSON object from which the core keys are
//! removed. Whatever is left is forwarded to the backend untouched.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Top-level keys owned by the gateway. Everything else is an extension.
pub const RESERVED_KEYS: [&str; 3] = ["model", "messages", "stream"];

/// Errors from parsing the inbound body.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The body does not match the chat completion schema.
    #[error("Invalid request format: {0}")]
    Format(String),

    /// The body is not a JSON object.
    #[error("Invalid JSON format: {0}")]
    Json(#[source] serde_json::Error),
}

/// One conversation turn. Opaque to the gateway beyond being a JSON object.
pub type Message = Map<String, Value>;

/// The core fields of a chat completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Caller-facing model name.
    pub model: String,
    /// Conversation turns, in order.
    pub messages: Vec<Message>,
    /// Whether the caller wants a streamed response. Absent or `null` means no.
    #[serde(default, deserialize_with = "null_as_false")]
    pub stream: bool,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Caller-supplied top-level fields other than the reserved ones.
///
/// Construction strips reserved keys, so an `ExtensionParams` can never carry
/// `model`, `messages` or `stream`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionParams(Map<String, Value>);

impl ExtensionParams {
    /// Split extension fields out of a full request object.
    #[must_use]
    pub fn from_object(mut all: Map<String, Value>) -> Self {
        for key in RESERVED_KEYS {
            all.remove(key);
        }
        Self(all)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub(crate) fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// A fully parsed inbound request.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub request: ChatRequest,
    pub extensions: ExtensionParams,
}

impl ParsedRequest {
    /// Parse a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, RequestError> {
        let request: ChatRequest =
            serde_json::from_slice(body).map_err(|e| RequestError::Format(e.to_string()))?;

        if request.model.is_empty() {
            return Err(RequestError::Format("field `model` must not be empty".into()));
        }
        if request.messages.is_empty() {
            return Err(RequestError::Format(
                "field `messages` must not be empty".into(),
            ));
        }

        let all: Map<String, Value> = serde_json::from_slice(body).map_err(RequestError::Json)?;

        Ok(Self {
            request,
            extensions: ExtensionParams::from_object(all),
        })
    }
}
