use miette::Diagnostic;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PREVIEW_LIMIT: usize = 100;

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
pub enum ConfigError {
    #[error("Preview limit must be at least 1 row")]
    #[diagnostic(
        code(sluice::config::preview_limit),
        help("Use a positive --preview-limit, the default is 100")
    )]
    InvalidPreviewLimit,

    #[error("Max memory must be at least 1 GB")]
    #[diagnostic(code(sluice::config::memory_limit))]
    InvalidMemoryLimit,
}

/// Configuration of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of rows kept as preview of every materialized table
    pub preview_limit: usize,

    /// Memory limit of the embedded engine, unlimited when unset
    pub max_memory_gb: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            max_memory_gb: None,
        }
    }
}

impl SessionConfig {
    /// Create a new config with validation
    pub fn try_new(
        preview_limit: usize,
        max_memory_gb: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if preview_limit == 0 {
            return Err(ConfigError::InvalidPreviewLimit);
        }

        if max_memory_gb == Some(0) {
            return Err(ConfigError::InvalidMemoryLimit);
        }

        Ok(Self {
            preview_limit,
            max_memory_gb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preview_limit() {
        assert_eq!(SessionConfig::default().preview_limit, 100);
        assert_eq!(
            SessionConfig::try_new(100, None).unwrap(),
            SessionConfig::default()
        );
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert_eq!(
            SessionConfig::try_new(0, None),
            Err(ConfigError::InvalidPreviewLimit)
        );
        assert_eq!(
            SessionConfig::try_new(10, Some(0)),
            Err(ConfigError::InvalidMemoryLimit)
        );
        assert!(SessionConfig::try_new(1, Some(2)).is_ok());
    }
}
