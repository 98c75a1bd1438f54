//! Service configuration via `recipeseq.toml`
//!
//! On first open a commented default `recipeseq.toml` is written into the
//! data directory. To change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use recipeseq_core::{NumberingError, Result};
use recipeseq_durability::DurabilityMode;

use crate::retry::RetryConfig;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "recipeseq.toml";

/// Default per-operation deadline in milliseconds.
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5000;

/// Numbering service configuration loaded from `recipeseq.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// op_timeout_ms = 5000
///
/// [retry]
/// max_retries = 5
/// base_delay_ms = 10
/// max_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberingConfig {
    /// Durability mode: `"cache"`, `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Per-operation deadline in milliseconds; 0 disables the deadline.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Conflict retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_op_timeout_ms() -> u64 {
    DEFAULT_OP_TIMEOUT_MS
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            retry: RetryConfig::default(),
        }
    }
}

impl NumberingConfig {
    /// Config for an in-memory service with no commit log.
    pub fn cache() -> Self {
        Self {
            durability: "cache".to_string(),
            ..Self::default()
        }
    }

    /// Set the durability mode by name.
    pub fn with_durability(mut self, durability: impl Into<String>) -> Self {
        self.durability = durability.into();
        self
    }

    /// Set the per-operation deadline.
    pub fn with_op_timeout_ms(mut self, op_timeout_ms: u64) -> Self {
        self.op_timeout_ms = op_timeout_ms;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the string is not a known mode.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        DurabilityMode::parse(&self.durability).ok_or_else(|| {
            NumberingError::validation(format!(
                "Invalid durability mode '{}' in {}. Expected \"cache\", \"standard\" or \"always\".",
                self.durability, CONFIG_FILE_NAME
            ))
        })
    }

    /// Per-operation deadline, `None` when disabled.
    pub fn op_timeout(&self) -> Option<Duration> {
        (self.op_timeout_ms > 0).then(|| Duration::from_millis(self.op_timeout_ms))
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Recipe numbering configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = commit log fsynced periodically, may lose the last interval on crash
#   "always"   = fsync every commit, zero data loss
#   "cache"    = no commit log, state is lost on shutdown
durability = "standard"

# Deadline for each create/delete/update/read in milliseconds (0 = none).
# Expired operations are aborted and report a timeout.
op_timeout_ms = 5000

# Conflict retries with capped exponential backoff.
[retry]
max_retries = 5
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the file cannot be read and `Validation` if it
    /// cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NumberingError::Storage {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let config: NumberingConfig = toml::from_str(&content).map_err(|e| {
            NumberingError::validation(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.durability_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| NumberingError::Storage {
                message: format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ),
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NumberingError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| NumberingError::Storage {
            message: format!("Failed to write config file '{}': {}", path.display(), e),
        })
    }
}
