//! Command-line arguments and their merge into [`GatewayConfig`].

use std::path::PathBuf;
use std::time::Duration;

use arkgate_core::{ConfigError, ConfigFile, GatewayConfig};
use clap::Parser;

/// OpenAI-compatible chat completion gateway for Ark deployments.
///
/// Every flag can also be set through the environment (or a `.env` file).
/// Flags win over the config file, which wins over built-in defaults.
#[derive(Debug, Parser)]
#[command(name = "arkgate")]
#[command(about = "Translate OpenAI-style chat completions onto Ark model deployments")]
#[command(version)]
pub struct Cli {
    /// JSON config file with host, port, base_url, timeout_secs, models,
    /// default_model and strict_models keys (all optional)
    #[arg(short, long, env = "ARKGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "ARKGATE_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "ARKGATE_PORT")]
    pub port: Option<u16>,

    /// Backend base URL; `/chat/completions` is appended
    #[arg(long, env = "ARKGATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Timeout in seconds for a whole backend exchange, streaming included
    #[arg(long, env = "ARKGATE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Reject unknown model names instead of using the default model
    #[arg(long, env = "ARKGATE_STRICT_MODELS")]
    pub strict_models: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Merge defaults, the optional config file, and flags.
    pub fn to_config(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = GatewayConfig::default();

        if let Some(path) = &self.config {
            config.apply_file(ConfigFile::load(path)?)?;
        }

        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(base_url) = &self.base_url {
            config.backend.base_url.clone_from(base_url);
        }
        if let Some(secs) = self.timeout_secs {
            config.backend.timeout = Duration::from_secs(secs);
        }
        if self.strict_models {
            config.strict_models = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub const fn default_log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
