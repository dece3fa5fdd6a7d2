use crate::error::StoreError;
use crate::pipeline::types::{AnalysisReport, AnalysisResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status together with the data that must accompany it.
///
/// A `Completed` state cannot exist without its report and a `Failed` state
/// cannot exist without its cause, so readers never see one half of a
/// terminal write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Processing,
    Completed { report: AnalysisReport },
    Failed { cause: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Processing => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// The single terminal write a pipeline run makes.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(AnalysisReport),
    Failed(String),
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed(report) => JobState::Completed { report },
            JobOutcome::Failed(cause) => JobState::Failed { cause },
        }
    }
}

/// Durable location of an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoReference {
    pub url: String,
    pub public_id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub sport: String,
    pub activity_type: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            sport: "Tennis".to_string(),
            activity_type: "Practice Drill".to_string(),
        }
    }
}

/// Everything the producer knows when it creates a job.
#[derive(Debug, Clone)]
pub struct NewAnalysisJob {
    pub user_id: String,
    pub video: VideoReference,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub user_id: String,
    pub video: VideoReference,
    pub metadata: SessionMetadata,
    #[serde(flatten)]
    state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// A fresh record in `processing`.
    pub fn new(new_job: NewAnalysisJob) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: new_job.user_id,
            video: new_job.video,
            metadata: new_job.metadata,
            state: JobState::Processing,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match &self.state {
            JobState::Completed { report } => Some(report),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.report().map(|report| &report.result)
    }

    pub fn failure_cause(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { cause } => Some(cause),
            _ => None,
        }
    }

    /// Moves the job out of `processing`. Terminal states are final.
    pub fn finish(&mut self, outcome: JobOutcome) -> Result<(), StoreError> {
        if self.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                id: self.id,
                status: self.status(),
            });
        }
        self.state = outcome.into();
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::types::FrameCoverage;

    pub(crate) fn new_job(user_id: &str) -> NewAnalysisJob {
        NewAnalysisJob {
            user_id: user_id.to_string(),
            video: VideoReference {
                url: "file:///tmp/serve".to_string(),
                public_id: "serve-01".to_string(),
                file_name: "serve.mp4".to_string(),
            },
            metadata: SessionMetadata::default(),
        }
    }

    pub(crate) fn report(score: u8) -> AnalysisReport {
        AnalysisReport {
            result: AnalysisResult {
                score,
                feedback: vec!["Excellent posture and core stability.".to_string()],
            },
            coverage: FrameCoverage {
                sampled: 10,
                scored: 10,
            },
        }
    }

    #[test]
    fn new_job_starts_processing() {
        let job = AnalysisJob::new(new_job("athlete-1"));
        assert_eq!(job.status(), JobStatus::Processing);
        assert!(job.report().is_none());
        assert!(job.failure_cause().is_none());
    }

    #[test]
    fn completion_carries_report() {
        let mut job = AnalysisJob::new(new_job("athlete-1"));
        job.finish(JobOutcome::Completed(report(91))).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result().unwrap().score, 91);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = AnalysisJob::new(new_job("athlete-1"));
        job.finish(JobOutcome::Completed(report(91))).unwrap();

        let err = job
            .finish(JobOutcome::Failed("late failure".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::AlreadyTerminal {
                id: job.id,
                status: JobStatus::Completed
            }
        );
        assert_eq!(job.status(), JobStatus::Completed);

        let mut failed = AnalysisJob::new(new_job("athlete-2"));
        failed.finish(JobOutcome::Failed("decoder crashed".to_string())).unwrap();
        assert!(failed.finish(JobOutcome::Completed(report(50))).is_err());
        assert_eq!(failed.failure_cause(), Some("decoder crashed"));
    }

    #[test]
    fn serializes_status_alongside_payload() {
        let mut job = AnalysisJob::new(new_job("athlete-1"));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "processing");

        job.finish(JobOutcome::Failed("timeout".to_string())).unwrap();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["cause"], "timeout");

        let back: AnalysisJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
