pub mod history;
pub mod job;
pub mod memory;

pub use history::HistorySummary;
pub use job::{
    AnalysisJob, JobOutcome, JobState, JobStatus, NewAnalysisJob, SessionMetadata,
    VideoReference,
};
pub use memory::InMemoryJobStore;

use crate::error::StoreError;
use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

/// How a store lets readers follow a record.
pub enum JobSubscription {
    /// Every committed change is pushed to the receiver.
    Live(watch::Receiver<AnalysisJob>),
    /// The store has no change feed; readers must poll `get`.
    Unsupported,
}

/// Shared document store holding analysis job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a record in `processing` and returns it with its assigned id.
    async fn create(&self, new_job: NewAnalysisJob) -> Result<AnalysisJob, StoreError>;

    async fn get(&self, id: Uuid) -> Result<AnalysisJob, StoreError>;

    /// Applies the terminal write unless the record is already terminal.
    async fn finish(&self, id: Uuid, outcome: JobOutcome) -> Result<AnalysisJob, StoreError>;

    /// All jobs owned by `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnalysisJob>, StoreError>;

    async fn subscribe(&self, _id: Uuid) -> Result<JobSubscription, StoreError> {
        Ok(JobSubscription::Unsupported)
    }
}
