//! Durability mode configuration
//!
//! Controls whether commits are logged and when the log is fsynced.

/// Durability mode for the commit log
///
/// # Modes
///
/// | Mode | Log file | fsync | Data Loss Window |
/// |------|----------|-------|-----------------|
/// | Cache | none | Never | Everything |
/// | Standard | yes | Every N commits or T ms | Up to the batch |
/// | Always | yes | Every commit | Zero |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// In-memory only; no log is written
    Cache,

    /// fsync after every commit
    Always,

    /// fsync every `batch_size` commits OR every `interval_ms` milliseconds
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum commits between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Whether commits are written to a log file at all
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// Whether every commit is fsynced before it becomes visible
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// `Standard { interval_ms: 100, batch_size: 1000 }`
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }

    /// Parse the config-file spelling of a mode
    ///
    /// Accepts `"cache"`, `"standard"` and `"always"`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cache" => Some(DurabilityMode::Cache),
            "standard" => Some(Self::standard_default()),
            "always" => Some(DurabilityMode::Always),
            _ => None,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_has_no_log() {
        assert!(!DurabilityMode::Cache.requires_log());
        assert!(DurabilityMode::Always.requires_log());
        assert!(DurabilityMode::default().requires_log());
    }

    #[test]
    fn test_parse() {
        assert_eq!(DurabilityMode::parse("cache"), Some(DurabilityMode::Cache));
        assert_eq!(DurabilityMode::parse("always"), Some(DurabilityMode::Always));
        assert_eq!(
            DurabilityMode::parse("standard"),
            Some(DurabilityMode::standard_default())
        );
        assert_eq!(DurabilityMode::parse("sometimes"), None);
    }
}
