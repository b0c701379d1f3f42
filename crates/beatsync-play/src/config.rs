use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Playback controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds added to "now" when a start time is missing or already past.
    pub default_start_offset: f64,
    /// Fade used when a start or stop does not give one (seconds for a full swing).
    pub default_fade_duration: f64,
    /// Whether pausing drops the global time scale to zero.
    pub pause_time_scale: bool,
    /// Initial latency trim applied to music time (seconds).
    pub manual_offset: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_start_offset: 0.5,
            default_fade_duration: 0.0,
            pause_time_scale: true,
            manual_offset: 0.0,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&mut self) {
        self.default_start_offset = finite_or(self.default_start_offset, 0.5).clamp(0.0, 10.0);
        self.default_fade_duration = finite_or(self.default_fade_duration, 0.0).clamp(0.0, 60.0);
        self.manual_offset = finite_or(self.manual_offset, 0.0).clamp(-5.0, 5.0);
    }

    /// Read config from a JSON file.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: PlaybackConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    /// Write config to a JSON file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.default_start_offset, 0.5);
        assert_eq!(config.default_fade_duration, 0.0);
        assert!(config.pause_time_scale);
        assert_eq!(config.manual_offset, 0.0);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = PlaybackConfig {
            default_start_offset: -1.0,
            default_fade_duration: f64::NAN,
            pause_time_scale: false,
            manual_offset: 30.0,
        };
        config.validate();
        assert_eq!(config.default_start_offset, 0.0);
        assert_eq!(config.default_fade_duration, 0.0);
        assert_eq!(config.manual_offset, 5.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlaybackConfig = serde_json::from_str(r#"{"defaultFadeDuration": 1.5}"#).unwrap();
        assert_eq!(config.default_fade_duration, 1.5);
        assert_eq!(config.default_start_offset, 0.5);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");
        let config = PlaybackConfig {
            manual_offset: 0.03,
            pause_time_scale: false,
            ..Default::default()
        };
        config.write(&path).unwrap();
        assert_eq!(PlaybackConfig::read(&path).unwrap(), config);
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let err = PlaybackConfig::read(Path::new("/nonexistent/playback.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/playback.json"));
    }
}
