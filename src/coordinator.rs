use crate::{
    config::Settings,
    error::AppError,
    intake::{
        FileSystemSink, IngestionSink, StoredVideoDecoder, UploadPolicy, VideoDecoder, VideoUpload,
    },
    pipeline::{
        AnalysisWorker, DefaultPipelineFactory, DetectorProvider, PipelineFactory, RetryPolicy,
    },
    store::{
        AnalysisJob, HistorySummary, InMemoryJobStore, JobStore, NewAnalysisJob, SessionMetadata,
        VideoReference,
    },
    watcher::JobStatusWatcher,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Entry point tying ingestion, the job store, analysis workers and watchers together.
pub struct Coordinator {
    settings: Settings,
    store: Arc<dyn JobStore>,
    sink: Arc<dyn IngestionSink>,
    policy: UploadPolicy,
    pipelines: Arc<dyn PipelineFactory>,
    worker: AnalysisWorker,
    tasks: TaskTracker,
    cancel_token: CancellationToken,
}

impl Coordinator {
    pub fn builder(settings: Settings) -> CoordinatorBuilder {
        CoordinatorBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Checks and stores an upload, then starts analysing it.
    ///
    /// Rejected uploads never produce a job record.
    pub async fn submit(&self, upload: VideoUpload) -> Result<AnalysisJob, AppError> {
        self.policy.check(&upload)?;
        let video = self.sink.store(&upload).await?;
        self.submit_stored(upload.user_id, video, upload.metadata)
            .await
    }

    /// Creates the job record for an already stored video and spawns its worker.
    pub async fn submit_stored(
        &self,
        user_id: impl Into<String>,
        video: VideoReference,
        metadata: SessionMetadata,
    ) -> Result<AnalysisJob, AppError> {
        if self.cancel_token.is_cancelled() {
            return Err(AppError::Coordinator(
                "Coordinator is shutting down".to_string(),
            ));
        }

        let job = self
            .store
            .create(NewAnalysisJob {
                user_id: user_id.into(),
                video,
                metadata,
            })
            .await?;
        info!("Submitted analysis job {} for {}", job.id, job.user_id);

        let worker = self.worker.clone();
        let pipeline = self.pipelines.build();
        let cancel = self.cancel_token.child_token();
        let spawned = job.clone();
        self.tasks.spawn(async move {
            let id = spawned.id;
            if let Err(e) = worker.run(spawned, pipeline, cancel).await {
                error!("Job {} could not be finalized: {}", id, e);
            }
        });

        Ok(job)
    }

    pub fn watcher(&self) -> JobStatusWatcher {
        JobStatusWatcher::from_settings(self.store.clone(), &self.settings.watcher)
    }

    /// A user's jobs, newest first, with a summary of their scores.
    pub async fn history(
        &self,
        user_id: &str,
    ) -> Result<(Vec<AnalysisJob>, HistorySummary), AppError> {
        let jobs = self.store.list_for_user(user_id).await?;
        let summary = HistorySummary::from_jobs(&jobs);
        Ok((jobs, summary))
    }

    /// Cancels running jobs and waits until each has written its terminal state.
    pub async fn shutdown(&self) {
        info!("Shutting down coordinator");
        self.cancel_token.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

pub struct CoordinatorBuilder {
    settings: Settings,
    store: Option<Arc<dyn JobStore>>,
    sink: Option<Arc<dyn IngestionSink>>,
    decoder: Option<Arc<dyn VideoDecoder>>,
    detectors: Option<Arc<dyn DetectorProvider>>,
}

impl CoordinatorBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            sink: None,
            decoder: None,
            detectors: None,
        }
    }

    // Sets the sample count, this will override the default configuration.
    pub fn frame_count(mut self, frame_count: usize) -> Self {
        self.settings.sampling.frame_count = frame_count;
        self
    }

    // Sets the processing limit, this will override the default configuration.
    pub fn max_processing_secs(mut self, max_processing_secs: u64) -> Self {
        self.settings.job.max_processing_secs = max_processing_secs;
        self
    }

    // Sets the watcher timeout, this will override the default configuration.
    pub fn watcher_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.settings.watcher.timeout_secs = timeout_secs;
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn IngestionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn VideoDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn detectors(mut self, detectors: Arc<dyn DetectorProvider>) -> Self {
        self.detectors = Some(detectors);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.settings.validate()?;
        let detectors = self
            .detectors
            .ok_or(AppError::Coordinator("Pose detector not set".to_string()))?;
        let store: Arc<dyn JobStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryJobStore::new()),
        };
        let decoder: Arc<dyn VideoDecoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(StoredVideoDecoder::from_settings(&self.settings.video)),
        };
        let sink: Arc<dyn IngestionSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(FileSystemSink::new(&self.settings.ingest.upload_dir)),
        };

        let pipelines = Arc::new(DefaultPipelineFactory::from_settings(
            &self.settings,
            decoder,
            detectors,
        ));
        let worker = AnalysisWorker::new(
            store.clone(),
            RetryPolicy::from(&self.settings.job),
            self.settings.job.max_processing_time(),
        );

        Ok(Coordinator {
            policy: UploadPolicy::new(self.settings.ingest.max_upload_bytes),
            settings: self.settings,
            store,
            sink,
            pipelines,
            worker,
            tasks: TaskTracker::new(),
            cancel_token: CancellationToken::new(),
        })
    }
}
