//! Viewer settings persistence
//!
//! Settings live in `attachview.toml`, either next to the working directory or
//! at an explicit `--config` path. Every key is optional; anything missing
//! falls back to the built-in defaults and command-line flags win over both.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::curve::CURVE_DIVISIONS;
use super::geometry::NormalizationScope;

/// Filename looked up when no explicit path is given
pub const SETTINGS_FILENAME: &str = "attachview.toml";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Radians per 1/60 s
pub const DEFAULT_ROTATION_SPEED: f32 = 0.01;
pub const DEFAULT_MARKER_RADIUS: f32 = 2.0;

/// Record service connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Spline viewer tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewerSettings {
    pub normalization_scope: Option<NormalizationScope>,
    pub rotation_speed: Option<f32>,
    pub marker_radius: Option<f32>,
    pub curve_divisions: Option<usize>,
}

/// Top-level settings struct, serialized as attachview.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub api: Option<ApiSettings>,
    pub viewer: Option<ViewerSettings>,
}

impl Settings {
    /// Load settings from a file. Returns Ok(None) if the file doesn't exist.
    pub fn load_from_path(path: &Path) -> Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings =
            toml::from_str(&contents).map_err(|e| SettingsError::ParseToml {
                path: path.to_path_buf(),
                source: e,
            })?;
        info!("Loaded settings from {:?}", path);
        Ok(Some(settings))
    }

    /// Load `attachview.toml` from a directory
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, SettingsError> {
        Self::load_from_path(&dir.join(SETTINGS_FILENAME))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = toml::to_string_pretty(self).map_err(|e| SettingsError::SerializeToml {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, contents).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Fill in defaults for every missing key
    pub fn resolve(&self) -> ViewerConfig {
        let api = self.api.clone().unwrap_or_default();
        let viewer = self.viewer.clone().unwrap_or_default();
        ViewerConfig {
            base_url: api.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            normalization_scope: viewer.normalization_scope.unwrap_or_default(),
            rotation_speed: viewer.rotation_speed.unwrap_or(DEFAULT_ROTATION_SPEED),
            marker_radius: viewer
                .marker_radius
                .filter(|r| *r > 0.0)
                .unwrap_or(DEFAULT_MARKER_RADIUS),
            curve_divisions: viewer
                .curve_divisions
                .filter(|d| *d > 0)
                .unwrap_or(CURVE_DIVISIONS),
        }
    }
}

/// Effective configuration after defaults and CLI overrides
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub normalization_scope: NormalizationScope,
    /// Group rotation in radians per 1/60 s
    pub rotation_speed: f32,
    pub marker_radius: f32,
    pub curve_divisions: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Settings::default().resolve()
    }
}

/// Errors that can occur during settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize TOML for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Settings::default().resolve();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.normalization_scope, NormalizationScope::Global);
        assert_eq!(config.rotation_speed, 0.01);
        assert_eq!(config.marker_radius, 2.0);
        assert_eq!(config.curve_divisions, 100);
    }

    #[test]
    fn test_partial_toml() {
        let toml_str = r#"
[viewer]
normalization_scope = "per-spline"
marker_radius = 0.5
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(settings.api.is_none());

        let config = settings.resolve();
        assert_eq!(config.normalization_scope, NormalizationScope::PerSpline);
        assert_eq!(config.marker_radius, 0.5);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let toml_str = r#"
[viewer]
marker_radius = -1.0
curve_divisions = 0
"#;
        let config = toml::from_str::<Settings>(toml_str).unwrap().resolve();
        assert_eq!(config.marker_radius, DEFAULT_MARKER_RADIUS);
        assert_eq!(config.curve_divisions, CURVE_DIVISIONS);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load_from_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);

        let settings = Settings {
            api: Some(ApiSettings {
                base_url: Some("https://records.example.org".to_string()),
                timeout_secs: Some(5),
            }),
            viewer: None,
        };
        settings.save_to_path(&path).unwrap();

        let loaded = Settings::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.resolve().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        std::fs::write(&path, "[api\nbase_url = ").unwrap();

        let err = Settings::load_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::ParseToml { .. }));
        assert!(err.to_string().contains(SETTINGS_FILENAME));
    }
}
