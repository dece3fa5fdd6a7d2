use super::PoseDetector;
use crate::common::VideoFrame;
use crate::error::DetectionError;
use crate::pipeline::types::PoseLandmarkSet;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TOLERANCE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Deserialize)]
pub struct TrackEntry {
    pub timestamp_ms: u64,
    pub landmarks: PoseLandmarkSet,
}

/// Replays a pose track captured offline, one entry per detected frame.
///
/// A frame gets the entry nearest its offset when that entry lies within
/// the tolerance; otherwise the frame has no detection.
#[derive(Debug, Clone)]
pub struct RecordedPoseDetector {
    track: Vec<TrackEntry>,
    tolerance: Duration,
}

impl RecordedPoseDetector {
    pub fn new(mut track: Vec<TrackEntry>) -> Self {
        track.sort_by_key(|entry| entry.timestamp_ms);
        Self {
            track,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            DetectionError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json).map_err(|e| {
            DetectionError::Unavailable(format!("invalid pose track {}: {}", path.display(), e))
        })
    }

    pub fn len(&self) -> usize {
        self.track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }

    fn nearest(&self, offset: Duration) -> Option<&TrackEntry> {
        let target = u64::try_from(offset.as_millis()).unwrap_or(u64::MAX);
        let split = self.track.partition_point(|entry| entry.timestamp_ms < target);

        let before = split.checked_sub(1).and_then(|i| self.track.get(i));
        let after = self.track.get(split);
        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if target - b.timestamp_ms <= a.timestamp_ms - target {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        let distance = nearest.timestamp_ms.abs_diff(target);
        (Duration::from_millis(distance) <= self.tolerance).then_some(nearest)
    }
}

#[async_trait]
impl PoseDetector for RecordedPoseDetector {
    async fn detect(
        &mut self,
        frame: &VideoFrame,
    ) -> Result<Option<PoseLandmarkSet>, DetectionError> {
        let entry = self.nearest(frame.offset());
        debug!(
            "Recorded track lookup at {}ms: {}",
            frame.offset().as_millis(),
            if entry.is_some() { "hit" } else { "miss" }
        );
        Ok(entry.map(|entry| entry.landmarks.clone()))
    }
}
