pub mod recorded;

pub use recorded::RecordedPoseDetector;

use crate::common::VideoFrame;
use crate::error::DetectionError;
use crate::pipeline::types::{DetectorOptions, PoseLandmarkSet};
use async_trait::async_trait;

/// The external pose-detection capability.
///
/// One instance is one detector session; frames are submitted to it one
/// at a time.
#[async_trait]
pub trait PoseDetector: Send {
    /// Applies session options before the first frame.
    async fn configure(&mut self, _options: DetectorOptions) -> Result<(), DetectionError> {
        Ok(())
    }

    /// Returns the landmarks of the detected body, or `None` when no body is found.
    async fn detect(&mut self, frame: &VideoFrame)
    -> Result<Option<PoseLandmarkSet>, DetectionError>;
}

/// Hands out a fresh detector session for every analysis run.
pub trait DetectorProvider: Send + Sync {
    fn create(&self) -> Box<dyn PoseDetector>;
}

impl<F> DetectorProvider for F
where
    F: Fn() -> Box<dyn PoseDetector> + Send + Sync,
{
    fn create(&self) -> Box<dyn PoseDetector> {
        self()
    }
}
