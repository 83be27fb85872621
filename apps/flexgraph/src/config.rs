//! # Configuration
//!
//! Optional TOML file plus environment overrides. Every field has a
//! default, so an empty or absent file is a valid configuration.
//!
//! ```toml
//! [storage]
//! path = "flexgraph.redb"
//!
//! [autosave]
//! debounce_ms = 500
//!
//! [render]
//! frame_ms = 16
//!
//! [log]
//! format = "text"   # or "json"
//! ```
//!
//! Environment: `FLEXGRAPH_DB` overrides `storage.path`,
//! `FLEXGRAPH_LOG_FORMAT` overrides `log.format`.

use flexgraph_core::FlexError;
use flexgraph_core::primitives::{AUTO_SAVE_DEBOUNCE, FRAME_INTERVAL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = "flexgraph.toml";

pub const ENV_DATABASE: &str = "FLEXGRAPH_DB";
pub const ENV_LOG_FORMAT: &str = "FLEXGRAPH_LOG_FORMAT";

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// redb file holding the durable snapshot.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flexgraph.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: AUTO_SAVE_DEBOUNCE.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_ms: FRAME_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `text` or `json`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub autosave: AutosaveConfig,
    pub render: RenderConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, FlexError> {
        toml::from_str(text).map_err(|e| FlexError::DeserializationError(e.to_string()))
    }

    /// Load `explicit`, or [`DEFAULT_CONFIG_PATH`] if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FlexError> {
        let path = match explicit {
            Some(path) => path,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlexError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Apply environment overrides read through `lookup`.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.storage.path = PathBuf::from(db);
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.is_empty()) {
            self.log.format = format;
        }
        self
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave.debounce_ms)
    }

    /// Frame interval, never shorter than 1 ms.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.render.frame_ms.max(1))
    }

    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log.format.eq_ignore_ascii_case("json")
    }
}
