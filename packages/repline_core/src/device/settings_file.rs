//! JSON-file settings persistence

use std::fs;
use std::path::PathBuf;

use super::traits::SettingsStore;
use super::DeviceError;
use crate::workout::WorkoutSettings;

/// `SettingsStore` backed by a single JSON file.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Option<WorkoutSettings>, DeviceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| DeviceError::Storage(format!("failed to read settings: {}", e)))?;
        let settings = serde_json::from_str(&contents)
            .map_err(|e| DeviceError::Storage(format!("failed to parse settings: {}", e)))?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &WorkoutSettings) -> Result<(), DeviceError> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| DeviceError::Storage(format!("failed to serialize settings: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| DeviceError::Storage(format!("failed to write settings: {}", e)))
    }

    fn clear(&self) -> Result<(), DeviceError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| DeviceError::Storage(format!("failed to clear settings: {}", e)))?;
        }
        Ok(())
    }
}
