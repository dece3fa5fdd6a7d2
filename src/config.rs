use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

const ENV_PREFIX: &str = "COACHCAM";
const DEFAULT_CONFIG_FILE: &str = "coachcam.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub sampling: SamplingSettings,
    pub detector: DetectorSettings,
    pub ingest: IngestSettings,
    pub video: VideoSettings,
    pub job: JobSettings,
    pub watcher: WatcherSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub frame_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_complexity: u8,
    pub smooth_landmarks: bool,
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub max_upload_bytes: u64,
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Frame rate of image sequences and of frames extracted from containers.
    pub fps: f64,
    pub ffmpeg_program: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub max_processing_secs: u64,
    /// How long a terminal write keeps being retried before the worker gives up.
    pub write_deadline_secs: u64,
    pub write_backoff_ms: u64,
    pub write_backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub progress_tick_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sampling: SamplingSettings::default(),
            detector: DetectorSettings::default(),
            ingest: IngestSettings::default(),
            video: VideoSettings::default(),
            job: JobSettings::default(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self { frame_count: 10 }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
            smooth_landmarks: true,
            frame_timeout_ms: 5_000,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            ffmpeg_program: "ffmpeg".to_string(),
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_processing_secs: 120,
            write_deadline_secs: 600,
            write_backoff_ms: 200,
            write_backoff_max_ms: 5_000,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            poll_interval_ms: 1_000,
            progress_tick_ms: 150,
        }
    }
}

impl Settings {
    /// Loads defaults, then `coachcam.toml` if present, then `COACHCAM__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.frame_count == 0 {
            return Err(invalid("sampling.frame_count", "must be greater than 0"));
        }

        let confidences = [
            (
                "detector.min_detection_confidence",
                self.detector.min_detection_confidence,
            ),
            (
                "detector.min_tracking_confidence",
                self.detector.min_tracking_confidence,
            ),
        ];
        for (key, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be between 0.0 and 1.0"));
            }
        }

        if self.detector.model_complexity > 2 {
            return Err(invalid("detector.model_complexity", "must be 0, 1 or 2"));
        }
        if self.detector.frame_timeout_ms == 0 {
            return Err(invalid("detector.frame_timeout_ms", "must be greater than 0"));
        }
        if self.ingest.max_upload_bytes == 0 {
            return Err(invalid("ingest.max_upload_bytes", "must be greater than 0"));
        }
        if self.job.max_processing_secs == 0 {
            return Err(invalid("job.max_processing_secs", "must be greater than 0"));
        }
        if !(self.video.fps > 0.0) {
            return Err(invalid("video.fps", "must be greater than 0"));
        }
        if self.job.write_deadline_secs == 0 {
            return Err(invalid("job.write_deadline_secs", "must be greater than 0"));
        }
        if self.watcher.timeout_secs == 0 {
            return Err(invalid("watcher.timeout_secs", "must be greater than 0"));
        }
        if self.watcher.poll_interval_ms == 0 || self.watcher.progress_tick_ms == 0 {
            return Err(invalid("watcher", "intervals must be greater than 0"));
        }

        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse::<Level>()
            .map_err(|e| invalid("log_level", e.to_string()))
    }
}

impl DetectorSettings {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl JobSettings {
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_secs(self.write_deadline_secs)
    }
}

impl WatcherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}
