// src/settings.rs
//
// TOML settings file. Every field has a default, so a missing file or a partial
// file both load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MonitorError;
use crate::history::DEFAULT_CAPACITY;
use crate::monitor::ProcessorConfig;
use crate::transmit::RequestDefinition;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Serial port path (e.g. "/dev/ttyACM0", "COM3")
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Unset keeps the pending record buffer unbounded
    #[serde(default)]
    pub max_pending_bytes: Option<usize>,
    /// Directory for log files (unset = stderr only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub trace_records: bool,
    /// Extra requests appended to the built-in catalog
    #[serde(default)]
    pub requests: Vec<RequestDefinition>,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            port: None,
            baud_rate: default_baud_rate(),
            history_capacity: default_history_capacity(),
            max_pending_bytes: None,
            log_dir: None,
            trace_records: false,
            requests: Vec::new(),
        }
    }
}

impl MonitorSettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, MonitorError> {
        Ok(toml::from_str(content)?)
    }

    /// Processor tuning derived from these settings
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            history_capacity: self.history_capacity,
            max_pending_bytes: self.max_pending_bytes,
            trace_records: self.trace_records,
        }
    }
}

/// `<config dir>/canmon/settings.toml`, if the platform has a config dir
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("canmon").join("settings.toml"))
}

/// Load settings from `path`. A missing file yields defaults.
pub fn load_settings(path: &Path) -> Result<MonitorSettings, MonitorError> {
    if !path.exists() {
        return Ok(MonitorSettings::default());
    }
    let content = std::fs::read_to_string(path)?;
    MonitorSettings::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = MonitorSettings::from_toml_str("").unwrap();
        assert_eq!(settings, MonitorSettings::default());
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.history_capacity, 50);
        assert!(settings.max_pending_bytes.is_none());
    }

    #[test]
    fn test_full_file() {
        let settings = MonitorSettings::from_toml_str(
            r#"
            port = "/dev/ttyACM0"
            baud_rate = 9600
            history_capacity = 200
            max_pending_bytes = 4096
            log_dir = "/tmp/canmon-logs"
            trace_records = true

            [[requests]]
            label = "Cell Balancing"
            id = 0x1930140
            "#,
        )
        .unwrap();

        assert_eq!(settings.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.requests, vec![RequestDefinition::new("Cell Balancing", 0x1930140)]);

        let config = settings.processor_config();
        assert_eq!(config.history_capacity, 200);
        assert_eq!(config.max_pending_bytes, Some(4096));
        assert!(config.trace_records);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let err = MonitorSettings::from_toml_str("history_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, MonitorError::Settings(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("canmon-no-such-dir").join("settings.toml");
        assert_eq!(load_settings(&path).unwrap(), MonitorSettings::default());
    }
}
