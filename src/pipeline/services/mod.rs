pub mod aggregator;
pub mod detection;
pub mod pose_scorer;

pub use aggregator::{ScoreAccumulator, aggregate};
pub use detection::{DetectorProvider, PoseDetector, RecordedPoseDetector};
pub use pose_scorer::{FrameDetection, PoseScorer};
