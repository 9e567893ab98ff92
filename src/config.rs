//! Manager configuration
//!
//! Values default to [`crate::constants`] and can be overridden from a JSON
//! file. The file is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::ConfigError;

/// Tunables for scanning, switching and capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Per-item wait for a rendered frame, in milliseconds
    pub frame_timeout_ms: u64,
    /// Minimum delay between two frame-ready polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Width of captured thumbnails; height follows the viewport aspect ratio
    pub thumbnail_width: u32,
    /// Aspect ratio used when the host cannot report one
    pub default_aspect_ratio: f32,
    /// Name hint passed to the host for interactive override nodes
    pub interactive_name_hint: String,
    /// Name hint passed to the host for preview override nodes
    pub preview_name_hint: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: constants::capture::DEFAULT_FRAME_TIMEOUT_MS,
            poll_interval_ms: constants::capture::DEFAULT_POLL_INTERVAL_MS,
            thumbnail_width: constants::thumbnail::DEFAULT_WIDTH,
            default_aspect_ratio: constants::thumbnail::DEFAULT_ASPECT_RATIO,
            interactive_name_hint: constants::node::INTERACTIVE_NAME_HINT.to_string(),
            preview_name_hint: constants::node::PREVIEW_NAME_HINT.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ManagerConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the per-user config file if there is one, defaults otherwise
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// `<config dir>/variant-manager/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::config::APP_DIR)
                .join(constants::config::FILE_NAME)
        })
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_timeout_ms == 0
            || self.frame_timeout_ms > constants::capture::MAX_FRAME_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid {
                field: "frame_timeout_ms",
                reason: format!(
                    "must be between 1 and {}",
                    constants::capture::MAX_FRAME_TIMEOUT_MS
                ),
            });
        }
        if self.poll_interval_ms > self.frame_timeout_ms {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must not exceed frame_timeout_ms".to_string(),
            });
        }
        if self.thumbnail_width == 0 {
            return Err(ConfigError::Invalid {
                field: "thumbnail_width",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.default_aspect_ratio.is_finite() && self.default_aspect_ratio > 0.0) {
            return Err(ConfigError::Invalid {
                field: "default_aspect_ratio",
                reason: "must be a positive number".to_string(),
            });
        }
        Ok(())
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
