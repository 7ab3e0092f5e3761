//! Bridge configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PLUGBRIDGE_ENTROPY_DEVICE` | `/dev/urandom` | Character device read by `fill_random` |
//! | `PLUGBRIDGE_LOG` | `plugbridge=info` | `tracing` filter directives |
//! | `PLUGBRIDGE_LOOP_NAME` | `plugbridge-loop` | Thread name of the message loop |
//!
//! The same keys can come from a TOML document (`entropy_device`,
//! `log_filter`, `loop_name`); environment variables override the file.
//!
//! ```toml
//! entropy_device = "/dev/urandom"
//! log_filter = "plugbridge=debug"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const ENV_ENTROPY_DEVICE: &str = "PLUGBRIDGE_ENTROPY_DEVICE";
pub const ENV_LOG: &str = "PLUGBRIDGE_LOG";
pub const ENV_LOOP_NAME: &str = "PLUGBRIDGE_LOOP_NAME";

pub const DEFAULT_ENTROPY_DEVICE: &str = "/dev/urandom";
pub const DEFAULT_LOG_FILTER: &str = "plugbridge=info";
pub const DEFAULT_LOOP_NAME: &str = "plugbridge-loop";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Secure random source; must be a character device
    pub entropy_device: PathBuf,
    /// `tracing_subscriber::EnvFilter` directives
    pub log_filter: String,
    pub loop_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            entropy_device: PathBuf::from(DEFAULT_ENTROPY_DEVICE),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            loop_name: DEFAULT_LOOP_NAME.to_string(),
        }
    }
}

/// Configuration document could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to parse bridge config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl BridgeConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError(e.to_string()))
    }

    /// Apply any non-empty environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(device) = non_empty_env(ENV_ENTROPY_DEVICE) {
            self.entropy_device = PathBuf::from(device);
        }
        if let Some(filter) = non_empty_env(ENV_LOG) {
            self.log_filter = filter;
        }
        if let Some(name) = non_empty_env(ENV_LOOP_NAME) {
            self.loop_name = name;
        }
        self
    }
}
