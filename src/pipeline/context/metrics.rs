use indexmap::IndexMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Stages of one analysis run, in the order they first execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Configure,
    Open,
    Decode,
    Detect,
    Aggregate,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Configure => "configure",
            PipelineStage::Open => "open",
            PipelineStage::Decode => "decode",
            PipelineStage::Detect => "detect",
            PipelineStage::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// Counters and timings collected while analysing one video.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub frames_requested: usize,
    pub frames_decoded: usize,
    pub frames_scored: usize,
    pub frames_without_pose: usize,
    pub frames_failed: usize,
    stage_durations: IndexMap<PipelineStage, Duration>,
}

impl PipelineMetrics {
    pub fn new(frames_requested: usize) -> Self {
        Self {
            frames_requested,
            ..Self::default()
        }
    }

    /// Adds `duration` to the running total for `stage`.
    pub fn record(&mut self, stage: PipelineStage, duration: Duration) {
        *self.stage_durations.entry(stage).or_default() += duration;
    }

    pub fn stage_duration(&self, stage: PipelineStage) -> Duration {
        self.stage_durations
            .get(&stage)
            .copied()
            .unwrap_or_default()
    }

    pub fn stage_durations(&self) -> impl Iterator<Item = (PipelineStage, Duration)> + '_ {
        self.stage_durations.iter().map(|(stage, d)| (*stage, *d))
    }

    pub fn total_duration(&self) -> Duration {
        self.stage_durations.values().sum()
    }

    /// Frames that reached the detector.
    pub fn frames_detected(&self) -> usize {
        self.frames_scored + self.frames_without_pose + self.frames_failed
    }

    pub fn log_summary(&self) {
        let stages: Vec<String> = self
            .stage_durations
            .iter()
            .map(|(stage, d)| format!("{}={}ms", stage, d.as_millis()))
            .collect();
        info!(
            "Analysis metrics: requested={} decoded={} scored={} no_pose={} failed={} [{}]",
            self.frames_requested,
            self.frames_decoded,
            self.frames_scored,
            self.frames_without_pose,
            self.frames_failed,
            stages.join(" ")
        );
    }
}
