//! Configuration file support for nanmgrd
//!
//! Loads and validates nanmgrd configuration from TOML files.
//! Default location: /etc/nan/nanmgrd.conf

use crate::error::{NanmgrError, Result};
use nan_core::NanLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nan/nanmgrd.conf";

/// Daemon runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Depth of the request channel between reader and event loop
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,
}

/// Complete nanmgrd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanmgrConfig {
    /// Identifier space and table sizes
    #[serde(default)]
    pub limits: NanLimits,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_depth() -> usize {
    64
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            channel_depth: default_channel_depth(),
        }
    }
}

impl NanmgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    NanmgrError::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "nanmgrd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(NanmgrError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NanmgrError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.limits.check().map_err(NanmgrError::Config)?;

        if self.daemon.channel_depth == 0 {
            return Err(NanmgrError::Config(
                "channel_depth must be > 0".to_string(),
            ));
        }

        EnvFilter::try_new(&self.daemon.log_level).map_err(|e| {
            NanmgrError::Config(format!(
                "invalid log_level {:?}: {}",
                self.daemon.log_level, e
            ))
        })?;

        Ok(())
    }
}
