//! Engine configuration, loaded from a TOML file.
//!
//! ```toml
//! database_path = "slots.sqlite"
//! busy_timeout_ms = 5000
//! max_occurrences_per_template = 2000
//! log_filter = "slot_engine=debug"
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// How long a booking commit waits for a competing write transaction.
    pub busy_timeout_ms: u64,

    /// Hard cap on occurrences materialized per recurrence template per expansion.
    pub max_occurrences_per_template: u16,

    /// Default tracing filter for binaries embedding the engine.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("slots.sqlite"),
            busy_timeout_ms: 5000,
            max_occurrences_per_template: 2000,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_occurrences_per_template == 0 {
            return Err(EngineError::Config(
                "max_occurrences_per_template must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
