//! Persisted application settings.
//!
//! Stored as pretty JSON. Missing fields take their defaults, so older or
//! hand-written files keep loading as settings are added.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use crate::crop::DEFAULT_CROPS_DIR;
use crate::error::{AnnotatorError, Result};
use crate::filter::FilterSettings;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "region-annotator.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Last filter parameters accepted by the user
    pub filter: FilterSettings,
    /// Where "crop" writes crops and the manifest
    pub crops_dir: PathBuf,
    /// Last directories used by the batch filter
    pub last_input_dir: Option<PathBuf>,
    pub last_output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            filter: FilterSettings::default(),
            crops_dir: PathBuf::from(DEFAULT_CROPS_DIR),
            last_input_dir: None,
            last_output_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.filter.check()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it is absent or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unusable config file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AnnotatorError::write_io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| AnnotatorError::write_io(path, e))
    }
}
