use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;

use crate::estimate::DEFAULT_CHUNKS_PER_PAGE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Timing and heuristics for page synchronization.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long viewport reports are muted after a programmatic move.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cooldown_ms")]
    pub cooldown: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "viewport_debounce_ms")]
    pub viewport_debounce: Duration,
    pub visibility_threshold: f32,
    pub chunks_per_page: u32,
    /// Delay before a failed renderer surface falls back to the text panel.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "renderer_fallback_ms")]
    pub renderer_fallback: Duration,
    pub observe_viewport: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(350),
            viewport_debounce: Duration::from_millis(100),
            visibility_threshold: 0.5,
            chunks_per_page: DEFAULT_CHUNKS_PER_PAGE,
            renderer_fallback: Duration::from_millis(1500),
            observe_viewport: true,
        }
    }
}

/// Reads a TOML file into `T`, falling back to `T::default()` when the file
/// does not exist.
pub fn load_toml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
