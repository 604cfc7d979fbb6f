//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`] over a single JSON document on disk.
//! Missing sections and keys take their defaults; the document is
//! validated on load and before every save.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::SystemConfig;
use crate::error::ConfigError;

pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load, falling back to defaults when the file is missing or cannot
    /// be parsed.  A document that parses but fails validation is still an
    /// error: running with silently altered limits is worse than not
    /// starting.
    pub fn load_or_default(&self) -> Result<SystemConfig, ConfigError> {
        match self.load() {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound) => {
                info!("no config at {}, using defaults", self.path.display());
                Ok(SystemConfig::default())
            }
            Err(e @ (ConfigError::Corrupted(_) | ConfigError::Io(_))) => {
                warn!("config {} unusable ({e}), using defaults", self.path.display());
                Ok(SystemConfig::default())
            }
            Err(e) => Err(e),
        }
    }
}

impl ConfigPort for JsonFileConfig {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound,
            _ => ConfigError::Io(e.to_string()),
        })?;
        let cfg: SystemConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        cfg.validate()?;
        info!("loaded config from {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text =
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Io(e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        fs::write(&self.path, text).map_err(|e| ConfigError::Io(e.to_string()))?;
        info!("config saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found_but_defaults_load() {
        let dir = tempfile::tempdir().unwrap();
        let port = JsonFileConfig::new(dir.path().join("absent.json"));
        assert_eq!(port.load(), Err(ConfigError::NotFound));
        assert_eq!(port.load_or_default().unwrap(), SystemConfig::default());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"controller":{"pi_controller":{"Kp":15.0}}}"#).unwrap();

        let cfg = JsonFileConfig::new(&path).load().unwrap();
        assert!((cfg.controller.pi_controller.kp - 15.0).abs() < 1e-6);
        assert_eq!(cfg.hardware, SystemConfig::default().hardware);
    }

    #[test]
    fn corrupt_document_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").unwrap();

        let port = JsonFileConfig::new(&path);
        assert!(matches!(port.load(), Err(ConfigError::Corrupted(_))));
        assert_eq!(port.load_or_default().unwrap(), SystemConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(
            &path,
            r#"{"hardware":{"pwm":{"min_duty_cycle":80.0,"max_duty_cycle":70.0}}}"#,
        )
        .unwrap();

        let port = JsonFileConfig::new(&path);
        assert!(matches!(port.load_or_default(), Err(ConfigError::ValidationFailed(_))));

        let mut bad = SystemConfig::default();
        bad.hardware.pwm.min_duty_cycle = 90.0;
        assert!(port.save(&bad).is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let port = JsonFileConfig::new(dir.path().join("sub/cfg.json"));
        let mut cfg = SystemConfig::default();
        cfg.controller.timing.t_eval = 4.5;
        port.save(&cfg).unwrap();
        assert_eq!(port.load().unwrap(), cfg);
    }
}
