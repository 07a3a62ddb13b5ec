//! Layered runtime settings
//!
//! Built-in defaults, then an optional TOML file, then `SENTINEL__*`
//! environment variables (`SENTINEL__MONITOR__SAMPLE_INTERVAL_MS=1500`).

use config::{Config, ConfigError, Environment, File};
use dms::{AnalyzerConfig, MonitorConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// File read when `SENTINEL_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "sentinel.toml";

/// Fallback variable for the analyzer key
const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub camera: CameraSettings,
    pub audio: AudioSettings,
    pub monitor: MonitorConfig,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit one JSON object per line
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSourceKind {
    /// Camera attached to this machine (`camera` feature)
    Device,
    /// Generated test pattern
    Synthetic,
    /// A still image on disk, served as every frame
    File,
}

impl Default for CameraSourceKind {
    fn default() -> Self {
        if cfg!(feature = "camera") {
            CameraSourceKind::Device
        } else {
            CameraSourceKind::Synthetic
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub source: CameraSourceKind,
    /// Device index when `source = "device"`
    pub index: i32,
    /// Required when `source = "file"`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Play the alarm on a sound device; silent otherwise
    pub enabled: bool,
    /// Output device name, default device when unset
    pub device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
        }
    }
}

impl Settings {
    /// Load from `SENTINEL_CONFIG` (or `sentinel.toml`) plus the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut settings = Self::load_from(&path)?;
        if settings.analyzer.api_key.is_none() {
            settings.analyzer.api_key = std::env::var(API_KEY_VAR).ok().filter(|k| !k.is_empty());
        }
        Ok(settings)
    }

    /// Load from a specific file; a missing file is not an error
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.camera.index, 0);
        assert!(settings.audio.enabled);
        assert_eq!(settings.monitor.sample_interval_ms, 2000);
        assert_eq!(settings.monitor.cooldown_secs, 3);
        assert!(settings.analyzer.api_key.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load_from("/nonexistent/sentinel-settings.toml").unwrap();
        assert_eq!(settings.monitor.jpeg_quality, 70);
    }

    #[test]
    fn test_partial_file_overrides() {
        let settings = from_toml(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [camera]
            source = "file"
            path = "/tmp/driver.jpg"

            [monitor]
            sample_interval_ms = 1500
            "#,
        );
        assert_eq!(settings.server.bind, "127.0.0.1:9000");
        assert_eq!(settings.camera.source, CameraSourceKind::File);
        assert_eq!(settings.camera.path, Some(PathBuf::from("/tmp/driver.jpg")));
        assert_eq!(settings.monitor.sample_interval_ms, 1500);
        // Untouched fields keep their defaults
        assert_eq!(settings.monitor.cooldown_secs, 3);
        assert!(!settings.log.json);
    }

    #[test]
    fn test_default_source_follows_camera_feature() {
        let expected = if cfg!(feature = "camera") {
            CameraSourceKind::Device
        } else {
            CameraSourceKind::Synthetic
        };
        assert_eq!(CameraSourceKind::default(), expected);
    }

    #[test]
    fn test_device_source_with_index() {
        let settings = from_toml(
            r#"
            [camera]
            source = "device"
            index = 2
            "#,
        );
        assert_eq!(settings.camera.source, CameraSourceKind::Device);
        assert_eq!(settings.camera.index, 2);
    }
}
