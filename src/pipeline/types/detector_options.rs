use crate::config::DetectorSettings;
use serde::{Deserialize, Serialize};

/// Options handed to the pose-detection capability when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_complexity: u8,
    pub smooth_landmarks: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
            smooth_landmarks: true,
        }
    }
}

impl From<&DetectorSettings> for DetectorOptions {
    fn from(settings: &DetectorSettings) -> Self {
        Self {
            min_detection_confidence: settings.min_detection_confidence,
            min_tracking_confidence: settings.min_tracking_confidence,
            model_complexity: settings.model_complexity,
            smooth_landmarks: settings.smooth_landmarks,
        }
    }
}
