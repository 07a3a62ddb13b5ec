//! DMS configuration

use camera_capture::CameraConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between the start of consecutive samples (milliseconds)
    pub sample_interval_ms: u64,

    /// Length of the alert before sampling resumes (seconds)
    pub cooldown_secs: u32,

    /// Analyzer calls running longer than this count as failed (milliseconds)
    pub analyzer_timeout_ms: u64,

    /// JPEG quality of samples (1-100)
    pub jpeg_quality: u8,

    /// Camera constraints
    pub camera: CameraConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2000,
            cooldown_secs: 3,
            analyzer_timeout_ms: 10_000,
            jpeg_quality: 70,
            camera: CameraConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer_timeout_ms.max(1))
    }

    /// Cooldown start value; never zero so an alert is always visible
    pub fn cooldown_ticks(&self) -> u32 {
        self.cooldown_secs.max(1)
    }
}

/// Remote analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// API base URL
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// API key; usually supplied through the environment
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.sample_interval(), Duration::from_millis(2000));
        assert_eq!(config.cooldown_ticks(), 3);
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.camera.ideal_width, 640);
    }

    #[test]
    fn test_partial_override() {
        let config: MonitorConfig = serde_json::from_str(r#"{"cooldown_secs": 5}"#).unwrap();
        assert_eq!(config.cooldown_ticks(), 5);
        assert_eq!(config.sample_interval_ms, 2000);
    }
}
