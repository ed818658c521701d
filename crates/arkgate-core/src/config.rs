//! Gateway configuration.
//!
//! Values come from three layers, lowest precedence first: built-in defaults,
//! an optional JSON config file ([`ConfigFile`]), and command-line/environment
//! overrides applied by the binary. The merged [`GatewayConfig`] is validated
//! once before the server accepts traffic and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ModelTable;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default listening host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default backend base URL (Volcengine Ark, OpenAI-compatible API).
pub const DEFAULT_BACKEND_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Upper bound for one backend exchange, streaming reads included.
/// Long reasoning generations can run for many minutes.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Path appended to the backend base URL for chat completions.
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The model table has no entry for its designated default.
    #[error("Default model '{0}' is not present in the model table")]
    MissingDefaultModel(String),

    /// A model maps to a blank deployment identifier.
    #[error("Model '{0}' maps to an empty deployment identifier")]
    EmptyDeployment(String),

    /// The backend base URL is blank.
    #[error("Backend base URL must not be empty")]
    EmptyBaseUrl,

    /// A zero timeout would abort every backend call.
    #[error("Backend timeout must be greater than zero")]
    ZeroTimeout,

    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`ConfigFile`].
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without the trailing endpoint path.
    pub base_url: String,
    /// Timeout covering connect, request, and the whole response body.
    pub timeout: Duration,
}

impl BackendConfig {
    /// Full URL of the chat completions endpoint.
    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}{CHAT_COMPLETIONS_PATH}",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Backend connection settings.
    pub backend: BackendConfig,
    /// Model name to deployment mapping.
    pub models: ModelTable,
    /// Reject unknown model names instead of falling back to the default.
    pub strict_models: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backend: BackendConfig::default(),
            models: ModelTable::builtin(),
            strict_models: false,
        }
    }
}

impl GatewayConfig {
    /// Check invariants the rest of the gateway relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.backend.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Apply a config file on top of this configuration.
    ///
    /// A file that supplies `models` replaces the whole table; a file that only
    /// supplies `default_model` re-targets the existing table.
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(base_url) = file.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(secs) = file.timeout_secs {
            self.backend.timeout = Duration::from_secs(secs);
        }
        if let Some(strict) = file.strict_models {
            self.strict_models = strict;
        }

        match (file.models, file.default_model) {
            (Some(entries), default_model) => {
                let default_model =
                    default_model.unwrap_or_else(|| self.models.default_model().to_string());
                self.models = ModelTable::new(entries, default_model)?;
            }
            (None, Some(default_model)) => {
                self.models = self.models.clone().with_default(default_model)?;
            }
            (None, None) => {}
        }

        Ok(())
    }
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub models: Option<BTreeMap<String, String>>,
    pub default_model: Option<String>,
    pub strict_models: Option<bool>,
}

impl ConfigFile {
    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }
}
