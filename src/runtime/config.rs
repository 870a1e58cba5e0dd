//! Runtime configuration.
//!
//! Configuration can be built in code or read from TOML:
//!
//! ```toml
//! worker_count = 8   # 0 = one worker per available CPU
//! max_stages = 12    # 0 = run until no further stage is defined
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Upper bound on explicitly configured workers.
pub const MAX_WORKERS: usize = 1024;

/// Configuration for the runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = auto-detect at run start).
    pub worker_count: usize,
    /// Maximum stage number a sample is driven to (0 = unlimited).
    pub max_stages: u32,
}

impl RuntimeConfig {
    pub fn new(worker_count: usize, max_stages: u32) -> Self {
        Self {
            worker_count,
            max_stages,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count > MAX_WORKERS {
            return Err(Error::InvalidArgument(format!(
                "worker_count {} exceeds maximum of {}",
                self.worker_count, MAX_WORKERS
            )));
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the available hardware parallelism.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_count
        }
    }

    /// Stage limit, `None` when unbounded.
    pub fn stage_limit(&self) -> Option<u32> {
        if self.max_stages == 0 {
            None
        } else {
            Some(self.max_stages)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            worker_count = 4
            max_stages = 12
        "#;

        let config = RuntimeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config, RuntimeConfig::new(4, 12));
        assert_eq!(config.resolved_worker_count(), 4);
        assert_eq!(config.stage_limit(), Some(12));
    }

    #[test]
    fn test_defaults_are_auto_and_unbounded() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config.worker_count, 0);
        assert!(config.resolved_worker_count() >= 1);
        assert_eq!(config.stage_limit(), None);
    }

    #[test]
    fn test_rejects_bad_config() {
        let err = RuntimeConfig::from_toml_str("worker_count = -1").unwrap_err();
        assert_eq!(err.status(), Status::InvalidArgument);

        let err = RuntimeConfig::from_toml_str("workers = 2").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = RuntimeConfig::from_toml_str("worker_count = 100000").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
