mod analysis;
mod detector_options;
mod landmarks;

pub use analysis::{AnalysisReport, AnalysisResult, FrameCoverage, FrameScore};
pub use detector_options::DetectorOptions;
pub use landmarks::{Landmark, POSE_LANDMARK_COUNT, PoseLandmark, PoseLandmarkSet};
