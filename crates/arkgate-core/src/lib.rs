//! Core domain for the arkgate chat completion gateway.
//!
//! Pure types with no HTTP dependencies: configuration, the model table,
//! the caller credential, inbound request parsing and backend payload
//! translation. The HTTP adapter lives in `arkgate-proxy`.

pub mod auth;
pub mod config;
pub mod models;
pub mod payload;
pub mod request;

pub use auth::Credential;
pub use config::{
    BackendConfig, CHAT_COMPLETIONS_PATH, ConfigError, ConfigFile, DEFAULT_BACKEND_URL,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, GatewayConfig,
};
pub use models::{DEFAULT_MODEL, ModelTable};
pub use payload::BackendPayload;
pub use request::{ChatRequest, ExtensionParams, Message, ParsedRequest, RESERVED_KEYS, RequestError};
