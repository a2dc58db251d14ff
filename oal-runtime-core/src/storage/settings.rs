use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::config::{CaptureConfiguration, ContextConfiguration};
use crate::models::error::AudioError;

/// Persisted runtime configuration.
///
/// Missing sections and fields fall back to their defaults, so a partial
/// file such as `{"context": {"output_rate": 48000}}` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub context: ContextConfiguration,
    pub capture: CaptureConfiguration,
}

impl RuntimeSettings {
    /// Check both sections, naming the offending field on failure.
    pub fn validate(&self) -> Result<(), AudioError> {
        self.context
            .validate()
            .map_err(AudioError::ConfigurationFailed)?;
        self.capture
            .validate()
            .map_err(AudioError::ConfigurationFailed)?;
        Ok(())
    }
}

/// Write settings as pretty-printed JSON.
pub fn write_settings(settings: &RuntimeSettings, path: &Path) -> Result<(), AudioError> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| AudioError::Storage(format!("failed to serialize settings: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| AudioError::Storage(format!("failed to write settings: {}", e)))?;
    Ok(())
}

/// Read and validate settings from a JSON file.
pub fn read_settings(path: &Path) -> Result<RuntimeSettings, AudioError> {
    let json = fs::read_to_string(path)
        .map_err(|e| AudioError::Storage(format!("failed to read settings: {}", e)))?;
    let settings: RuntimeSettings = serde_json::from_str(&json)
        .map_err(|e| AudioError::Storage(format!("failed to parse settings: {}", e)))?;
    settings.validate()?;
    log::debug!("loaded runtime settings from {}", path.display());
    Ok(settings)
}
