use crate::pipeline::types::{AnalysisResult, FrameScore};

/// Score reported when no frame produced a detection.
pub const FALLBACK_SCORE: u8 = 75;

pub const EXCELLENT_FEEDBACK: &str = "Excellent posture and core stability.";
pub const GOOD_FEEDBACK: &str = "Good effort. Focus on keeping your back straighter.";
pub const WARNING_FEEDBACK: &str = "Warning: Significant leaning detected. Work on your balance.";

/// Running sum and count of frame scores.
///
/// Order of insertion does not matter, and accumulators built on separate
/// tasks can be merged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreAccumulator {
    sum: f64,
    count: usize,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, score: FrameScore) {
        self.sum += score.value();
        self.count += 1;
    }

    pub fn merge(mut self, other: ScoreAccumulator) -> Self {
        self.sum += other.sum;
        self.count += other.count;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Rounded mean, or [`FALLBACK_SCORE`] when nothing was scored.
    pub fn final_score(&self) -> u8 {
        match self.mean() {
            Some(mean) => mean.round().clamp(0.0, 100.0) as u8,
            None => FALLBACK_SCORE,
        }
    }

    pub fn into_result(self) -> AnalysisResult {
        let score = self.final_score();
        AnalysisResult {
            score,
            feedback: vec![feedback_for(score).to_string()],
        }
    }
}

impl Extend<FrameScore> for ScoreAccumulator {
    fn extend<I: IntoIterator<Item = FrameScore>>(&mut self, scores: I) {
        for score in scores {
            self.push(score);
        }
    }
}

impl FromIterator<FrameScore> for ScoreAccumulator {
    fn from_iter<I: IntoIterator<Item = FrameScore>>(scores: I) -> Self {
        let mut accumulator = Self::new();
        accumulator.extend(scores);
        accumulator
    }
}

/// Band lookup, highest band first.
pub fn feedback_for(score: u8) -> &'static str {
    match score {
        s if s > 85 => EXCELLENT_FEEDBACK,
        s if s > 60 => GOOD_FEEDBACK,
        _ => WARNING_FEEDBACK,
    }
}

/// Reduces whatever frame scores were produced into one result.
pub fn aggregate<I>(scores: I) -> AnalysisResult
where
    I: IntoIterator<Item = FrameScore>,
{
    scores.into_iter().collect::<ScoreAccumulator>().into_result()
}
