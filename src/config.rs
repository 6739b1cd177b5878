// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::DEFAULT_RENDER_THREAD_NAME;
use crate::errors::{BridgeError, BridgeResult};
use crate::types::{Resolution, TextureFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Which conversion backend the converter should use
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConversionBackendKind {
    /// GPU compute kernel, falling back to the CPU kernel without an adapter
    #[default]
    Auto,
    /// GPU compute kernel only
    Gpu,
    /// CPU reference kernel only
    Cpu,
}

/// Adapter power preference
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// GPU adapter selection settings
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    /// Adapter power preference
    pub power_preference: PowerPreference,
    /// Force the software fallback adapter
    pub force_fallback_adapter: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture stream resolution (fixes converter and staging sizes)
    pub resolution: Resolution,
    /// Format of textures created by the lifecycle manager
    pub texture_format: TextureFormat,
    /// Conversion backend selection
    pub conversion: ConversionBackendKind,
    /// Name of the crate-owned render thread
    pub render_thread_name: String,
    /// GPU adapter settings
    pub gpu: GpuSettings,
    /// Log filter used when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            texture_format: TextureFormat::default(),
            conversion: ConversionBackendKind::default(),
            render_thread_name: DEFAULT_RENDER_THREAD_NAME.to_string(),
            gpu: GpuSettings::default(),
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        debug!(path = %path.display(), "Loading config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> BridgeResult<()> {
        if !self.resolution.is_valid() {
            return Err(BridgeError::Config(format!(
                "resolution must be non-zero, got {}",
                self.resolution
            )));
        }
        if self.render_thread_name.trim().is_empty() {
            return Err(BridgeError::Config(
                "render_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            Config::from_json_str(r#"{ "resolution": { "width": 640, "height": 480 } }"#).unwrap();
        assert_eq!(config.resolution, Resolution::new(640, 480));
        assert_eq!(config.render_thread_name, DEFAULT_RENDER_THREAD_NAME);
        assert_eq!(config.conversion, ConversionBackendKind::Auto);
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let result = Config::from_json_str(r#"{ "resolution": { "width": 0, "height": 480 } }"#);
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_empty_thread_name_rejected() {
        let result = Config::from_json_str(r#"{ "render_thread_name": "  " }"#);
        assert!(result.is_err());
    }
}
