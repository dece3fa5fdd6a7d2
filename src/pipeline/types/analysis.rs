use serde::{Deserialize, Serialize};

/// Biomechanical score of a single frame, always within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FrameScore(f64);

impl FrameScore {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    pub fn new(value: f64) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Final score and feedback for one analysed video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub score: u8,
    pub feedback: Vec<String>,
}

/// How many samples were taken and how many produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameCoverage {
    pub sampled: usize,
    pub scored: usize,
}

/// What a successful pipeline run writes into the job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub result: AnalysisResult,
    pub coverage: FrameCoverage,
}
