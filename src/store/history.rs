use super::AnalysisJob;
use serde::Serialize;

/// Aggregate view over a user's past analyses.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HistorySummary {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub average_score: Option<u8>,
    pub best_score: Option<u8>,
}

impl HistorySummary {
    pub fn from_jobs(jobs: &[AnalysisJob]) -> Self {
        let scores: Vec<u8> = jobs
            .iter()
            .filter_map(|job| job.result().map(|result| result.score))
            .collect();

        let average_score = if scores.is_empty() {
            None
        } else {
            let sum: u32 = scores.iter().map(|&s| u32::from(s)).sum();
            Some((f64::from(sum) / scores.len() as f64).round() as u8)
        };

        Self {
            total_jobs: jobs.len(),
            completed_jobs: scores.len(),
            average_score,
            best_score: scores.iter().copied().max(),
        }
    }
}
