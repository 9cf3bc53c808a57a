//! Configuration management for otad.
//!
//! Loads settings from /etc/otad/config.toml or uses defaults.
//! Calibration timing (poll interval, deadline) is fixed and not configurable.

use crate::device::Device;
use crate::error::ConfigError;
use crate::zcl::MODEL_BOSCH_BTH_RA;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/otad/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/otad/config.toml";

/// Post-update calibration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Start a calibration session after successful updates
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Model identifiers that need valve calibration after an update (exact match)
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_models() -> Vec<String> {
    vec![MODEL_BOSCH_BTH_RA.to_string()]
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            models: default_models(),
        }
    }
}

impl CalibrationConfig {
    pub fn requires_calibration(&self, device: &Device) -> bool {
        self.enabled && self.models.iter().any(|m| device.model_is(m))
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing-subscriber filter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No candidate could be loaded; `reason` is the last failure
    Defaults { reason: String },
}

impl ConfigSource {
    /// Report the outcome. Call once logging is initialised.
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Defaults { reason } => {
                warn!("Config not found, using defaults: {}", reason)
            }
        }
    }
}

impl Config {
    /// Load config from default locations
    pub fn load() -> (Self, ConfigSource) {
        Self::load_first([CONFIG_PATH, DEFAULT_CONFIG_PATH])
    }

    /// Load the first candidate that reads and parses, else the defaults
    pub fn load_first<I, P>(candidates: I) -> (Self, ConfigSource)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut reason = String::from("no config path given");
        for path in candidates {
            let path = path.as_ref();
            match Self::load_from_path(path) {
                Ok(config) => return (config, ConfigSource::File(path.to_path_buf())),
                Err(e) => reason = format!("{}: {}", path.display(), e),
            }
        }
        (Config::default(), ConfigSource::Defaults { reason })
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save default config to path (for init)
    pub fn save_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = Config::default().to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::IeeeAddr;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.calibration.enabled);
        assert_eq!(config.calibration.models, vec!["BTH-RA".to_string()]);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[calibration]
models = ["BTH-RA", "BTH-RM"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.calibration.models.len(), 2);
        // Defaults for missing fields
        assert!(config.calibration.enabled);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_requires_calibration() {
        let config = CalibrationConfig::default();
        assert!(config.requires_calibration(&Device::new(IeeeAddr(1), "BTH-RA")));
        assert!(!config.requires_calibration(&Device::new(IeeeAddr(1), "BTH-RM")));

        let disabled = CalibrationConfig {
            enabled: false,
            ..CalibrationConfig::default()
        };
        assert!(!disabled.requires_calibration(&Device::new(IeeeAddr(1), "BTH-RA")));
    }

    #[test]
    fn test_save_and_load_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otad").join("config.toml");

        Config::save_default(&path).unwrap();
        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("etc.toml");
        let fallback = dir.path().join("var.toml");

        let (config, source) = Config::load_first([&primary, &fallback]);
        assert_eq!(config, Config::default());
        match source {
            ConfigSource::Defaults { reason } => {
                assert!(reason.contains("var.toml"), "reason: {}", reason)
            }
            other => panic!("expected defaults, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("etc.toml");
        let fallback = dir.path().join("var.toml");
        fs::write(&fallback, "[logging]\nfilter = \"debug\"\n").unwrap();

        let (config, source) = Config::load_first([&primary, &fallback]);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(source, ConfigSource::File(fallback));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[calibration]\nmodels = 3\n").unwrap();

        assert!(matches!(
            Config::load_from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
