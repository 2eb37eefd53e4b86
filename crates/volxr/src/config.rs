//! Top-level configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use volxr_core::{ExtractorConfig, RendererOptions};

use crate::driver::FramePolicy;
use crate::error::Result;
use crate::logging::LoggingConfig;

/// Every tunable of a volxr application in one document.
///
/// Missing fields take their defaults, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolxrConfig {
    pub renderer: RendererOptions,
    pub extractor: ExtractorConfig,
    pub frame: FramePolicy,
    pub logging: LoggingConfig,
}

impl VolxrConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}
