//! Rollback configuration.
//!
//! The configuration is owned by the host (settings UI, persisted user
//! preferences); the controller only reads it. It arrives as JSON in the
//! same shape the settings layer stores it:
//!
//! ```
//! use rewind_engine::config::HistoryConfig;
//!
//! let config = HistoryConfig::from_json_str(r#"{"max_size": 50, "scroll_gesture": true}"#).unwrap();
//! assert_eq!(config.max_size, 50);
//! assert!(config.scroll_gesture);
//!
//! // Missing keys fall back to defaults.
//! let config = HistoryConfig::from_json_str("{}").unwrap();
//! assert_eq!(config, HistoryConfig::default());
//! ```

use rewind_history::ring::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};

/// Errors produced while loading or validating a [`HistoryConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `max_size` must be a positive integer.
    #[error("max_size must be at least 1, got 0")]
    ZeroCapacity,

    /// The configuration document is not valid JSON for this shape.
    #[error("invalid rollback configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only rollback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept. Read at capture time.
    pub max_size: usize,
    /// Whether the scroll wheel rolls back (up) and forward (down) one step.
    pub scroll_gesture: bool,
}

impl Default for HistoryConfig {
    /// 100 snapshots, scroll gesture off.
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CAPACITY,
            scroll_gesture: false,
        }
    }
}

impl HistoryConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: HistoryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
