use super::analysis_pipeline::AnalysisPipeline;
use super::retry::RetryPolicy;
use crate::error::{PipelineError, StoreError};
use crate::store::{AnalysisJob, JobOutcome, JobStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const CANCELLED_CAUSE: &str = "analysis cancelled";

/// Runs one job to completion and commits its single terminal write.
#[derive(Clone)]
pub struct AnalysisWorker {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
    max_processing: Duration,
}

impl AnalysisWorker {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryPolicy, max_processing: Duration) -> Self {
        Self {
            store,
            retry,
            max_processing,
        }
    }

    #[instrument(skip(self, job, pipeline, cancel), fields(job_id = %job.id))]
    pub async fn run(
        &self,
        job: AnalysisJob,
        mut pipeline: AnalysisPipeline,
        cancel: CancellationToken,
    ) -> Result<AnalysisJob, StoreError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Analysis cancelled before completion");
                JobOutcome::Failed(CANCELLED_CAUSE.to_string())
            }
            analysis = tokio::time::timeout(self.max_processing, pipeline.analyze(&job.video)) => {
                match analysis {
                    Ok(Ok(report)) => JobOutcome::Completed(report),
                    Ok(Err(e)) => {
                        error!("Analysis failed: {}", e);
                        JobOutcome::Failed(e.to_string())
                    }
                    Err(_) => {
                        let e = PipelineError::Timeout(self.max_processing.as_secs());
                        error!("{}", e);
                        JobOutcome::Failed(e.to_string())
                    }
                }
            }
        };
        drop(pipeline);

        self.commit(&job, outcome).await
    }

    /// Writes the terminal state, retrying backend failures with backoff
    /// until the write lands or the retry deadline passes.
    async fn commit(&self, job: &AnalysisJob, outcome: JobOutcome) -> Result<AnalysisJob, StoreError> {
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            match self.store.finish(job.id, outcome.clone()).await {
                Ok(finished) => {
                    info!("Job {} is {}", finished.id, finished.status());
                    return Ok(finished);
                }
                Err(e @ StoreError::AlreadyTerminal { .. }) => {
                    warn!("Discarding terminal write: {}", e);
                    return Err(e);
                }
                Err(e) if e.is_retryable() && started.elapsed() < self.retry.deadline => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Terminal write for job {} failed (attempt {}): {}; retrying in {}ms",
                        job.id,
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Giving up on terminal write for job {} after {} attempts: {}",
                        job.id, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}
