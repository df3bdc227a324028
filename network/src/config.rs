//! Networker configuration with TOML file support.

use std::path::Path;

use serde::{Deserialize, Serialize};
use seedswarm_types::NetworkIdentity;

use crate::logging::LogFormat;
use crate::transport::JoinOptions;
use crate::NetworkError;

/// Configuration for a [`SwarmNetworker`](crate::SwarmNetworker).
///
/// Can be loaded from a TOML file via [`NetworkerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkerConfig {
    /// Fixed network identity (64 hex chars). Random per process when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<NetworkIdentity>,

    /// Default for [`SeedOptions::announce`].
    #[serde(default = "default_true")]
    pub announce: bool,

    /// Default for [`SeedOptions::lookup`].
    #[serde(default = "default_true")]
    pub lookup: bool,

    /// Drop connections whose remote address is loopback.
    #[serde(default = "default_true")]
    pub reject_loopback: bool,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Transport-specific settings, handed to the transport factory as-is.
    #[serde(default)]
    pub transport: toml::Table,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NetworkerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NetworkError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NetworkError> {
        toml::from_str(s).map_err(|e| NetworkError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NetworkError> {
        toml::to_string_pretty(self).map_err(|e| NetworkError::Config(e.to_string()))
    }

    pub fn with_identity(mut self, identity: NetworkIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

impl Default for NetworkerConfig {
    fn default() -> Self {
        Self {
            identity: None,
            announce: true,
            lookup: true,
            reject_loopback: true,
            log_format: LogFormat::Human,
            log_level: default_log_level(),
            transport: toml::Table::new(),
        }
    }
}

/// Per-call overrides for `seed`. Unset flags fall back to the config defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedOptions {
    pub announce: Option<bool>,
    pub lookup: Option<bool>,
}

impl SeedOptions {
    pub fn announce(mut self, announce: bool) -> Self {
        self.announce = Some(announce);
        self
    }

    pub fn lookup(mut self, lookup: bool) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub(crate) fn resolve(self, config: &NetworkerConfig) -> JoinOptions {
        JoinOptions {
            announce: self.announce.unwrap_or(config.announce),
            lookup: self.lookup.unwrap_or(config.lookup),
        }
    }
}
