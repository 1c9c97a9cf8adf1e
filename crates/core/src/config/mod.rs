use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DaggerwalkError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub writer: WriterConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Missing sections fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    /// Rejects durations that are negative, not finite or too large to
    /// represent.
    pub fn validate(&self) -> Result<()> {
        parse_seconds(
            "scheduler.silence_duration_secs",
            self.scheduler.silence_duration_secs,
        )?;
        parse_seconds("telemetry.interval_secs", self.telemetry.interval_secs)?;
        Ok(())
    }
}

/// Converts a number of seconds into a [`Duration`], naming `field` in the
/// error when it cannot be represented.
pub fn parse_seconds(field: &str, secs: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(secs)
        .map_err(|err| DaggerwalkError::InvalidConfig(format!("{field} = {secs}: {err}")))
}

/// Lenient conversion for values that skipped validation: negatives and NaN
/// become zero, anything too large saturates.
fn saturating_seconds(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// Cadence settings for the track scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Completions of a track before shuffle moves on.
    pub repeats_per_track: u32,
    /// Non-silence tracks selected between silence intervals.
    pub tracks_before_silence: u32,
    pub silence_duration_secs: f32,
}

impl SchedulerConfig {
    pub fn silence_duration(&self) -> Duration {
        saturating_seconds(self.silence_duration_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            repeats_per_track: 5,
            tracks_before_silence: 3,
            silence_duration_secs: 90.0,
        }
    }
}

/// Configuration specific to the debounced snapshot writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub output_path: String,
    /// How long `flush` waits for an in-flight write before writing anyway.
    pub flush_timeout_ms: u64,
}

impl WriterConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            output_path: "MapData.json".to_string(),
            flush_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub interval_secs: f32,
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        saturating_seconds(self.interval_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daggerwalk.json");
        std::fs::write(&path, r#"{"scheduler": {"silence_duration_secs": 30.0}}"#).unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        assert_eq!(config.scheduler.silence_duration(), Duration::from_secs(30));
        assert_eq!(config.scheduler.repeats_per_track, 5);
        assert_eq!(config.writer.output_path, "MapData.json");
        assert_eq!(config.telemetry.interval(), Duration::from_secs(60));
    }

    #[test]
    fn malformed_config_surfaces_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, crate::DaggerwalkError::Json(_)));
    }

    #[test]
    fn out_of_range_durations_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        std::fs::write(&path, r#"{"scheduler": {"silence_duration_secs": 1e30}}"#).unwrap();

        let err = AppConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, DaggerwalkError::InvalidConfig(_)));
        assert!(err.to_string().contains("scheduler.silence_duration_secs"));

        std::fs::write(&path, r#"{"telemetry": {"interval_secs": -5.0}}"#).unwrap();
        let err = AppConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, DaggerwalkError::InvalidConfig(_)));
    }

    #[test]
    fn unvalidated_durations_saturate_instead_of_panicking() {
        let scheduler = SchedulerConfig {
            silence_duration_secs: 1e30,
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.silence_duration(), Duration::MAX);

        let telemetry = TelemetryConfig {
            interval_secs: f32::NAN,
        };
        assert_eq!(telemetry.interval(), Duration::ZERO);
        assert!(parse_seconds("tick", f32::INFINITY).is_err());
        assert_eq!(parse_seconds("tick", 1.5).unwrap(), Duration::from_millis(1_500));
    }
}
