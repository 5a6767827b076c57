//! Configuration for the node store
use crate::models::NodeType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`StoreConfig::error_clear_delay_ms`]
pub const ERROR_CLEAR_DELAY_ENV: &str = "NODEGRAPH_ERROR_CLEAR_DELAY_MS";

/// Tunables for a [`NodeStore`](super::NodeStore) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// How long a transient (rolled back) error stays in `StoreState::error`
    pub error_clear_delay_ms: u64,

    /// Title given to nodes created without one
    pub default_title: String,

    /// Type given to nodes created without one
    pub default_node_type: NodeType,

    /// Tags given to nodes created without any
    pub default_tags: Vec<String>,

    /// Buffer size of the domain event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            error_clear_delay_ms: 5_000,
            default_title: "Untitled".to_string(),
            default_node_type: NodeType::Thought,
            default_tags: vec!["misc".to_string()],
            event_channel_capacity: 128,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON config; absent keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid store config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read store config {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ERROR_CLEAR_DELAY_ENV) {
            config.error_clear_delay_ms = raw
                .trim()
                .parse()
                .map_err(|_| format!("{} must be an integer, got '{}'", ERROR_CLEAR_DELAY_ENV, raw))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_error_clear_delay(mut self, delay: Duration) -> Self {
        self.error_clear_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn error_clear_delay(&self) -> Duration {
        Duration::from_millis(self.error_clear_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_title.trim().is_empty() {
            return Err("default_title cannot be empty".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}
