//! Application preferences
//!
//! Small JSON blob in the platform config directory: the last opened
//! configuration file and the window size.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Preferences persisted across runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPreferences {
    /// Path to the last opened configuration file
    #[serde(rename = "lastConfigFile", default, skip_serializing_if = "Option::is_none")]
    pub last_config_file: Option<String>,

    /// Window width
    #[serde(rename = "windowWidth", default = "default_window_width")]
    pub window_width: u32,

    /// Window height
    #[serde(rename = "windowHeight", default = "default_window_height")]
    pub window_height: u32,
}

/// Default window width
fn default_window_width() -> u32 {
    1280
}

/// Default window height
fn default_window_height() -> u32 {
    800
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            last_config_file: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl AppPreferences {
    /// Get the preferences file path
    fn get_prefs_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("ar-stage");
            p.push("preferences.json");
            p
        })
    }

    /// Load preferences from the config directory
    pub fn load() -> Self {
        let Some(path) = Self::get_prefs_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save preferences to the config directory
    pub fn save(&self) -> Result<(), PreferencesError> {
        let Some(path) = Self::get_prefs_path() else {
            return Err(PreferencesError::NoConfigDir);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(PreferencesError::Io)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(PreferencesError::Json)?;
        fs::write(&path, json).map_err(PreferencesError::Io)?;
        Ok(())
    }

    /// Set the last opened configuration file and save
    pub fn set_last_config(&mut self, path: &PathBuf) {
        self.last_config_file = Some(path.to_string_lossy().to_string());
        if let Err(e) = self.save() {
            tracing::warn!("Failed to save preferences: {}", e);
        }
    }

    /// Get the last opened configuration file if it still exists
    pub fn get_last_config(&self) -> Option<PathBuf> {
        self.last_config_file
            .as_ref()
            .map(PathBuf::from)
            .filter(|p| p.exists())
    }

    /// Record the window size; written to disk with the next `save()`
    ///
    /// Resize events arrive continuously during a drag, so this does not
    /// save on its own.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
    }
}

/// Preference-related errors
#[derive(Debug)]
pub enum PreferencesError {
    Io(std::io::Error),
    Json(serde_json::Error),
    NoConfigDir,
}

impl std::fmt::Display for PreferencesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferencesError::Io(e) => write!(f, "IO error: {}", e),
            PreferencesError::Json(e) => write!(f, "JSON error: {}", e),
            PreferencesError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for PreferencesError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = AppPreferences::default();
        assert!(prefs.last_config_file.is_none());
        assert_eq!(prefs.window_width, 1280);
        assert_eq!(prefs.window_height, 800);
    }

    #[test]
    fn test_roundtrip_json() {
        let mut prefs = AppPreferences::default();
        prefs.last_config_file = Some("demo/experiences.json".to_string());
        let json = serde_json::to_string(&prefs).unwrap();
        let back: AppPreferences = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_config_file.as_deref(), Some("demo/experiences.json"));
        assert_eq!(back.window_width, prefs.window_width);
    }

    #[test]
    fn test_missing_fields_default() {
        let back: AppPreferences = serde_json::from_str("{}").unwrap();
        assert!(back.last_config_file.is_none());
        assert_eq!(back.window_width, 1280);
    }
}
