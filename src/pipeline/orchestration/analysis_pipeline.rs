use crate::error::{DetectionError, PipelineError};
use crate::intake::{FrameSampler, VideoDecoder};
use crate::pipeline::context::{PipelineMetrics, PipelineStage};
use crate::pipeline::services::aggregator::ScoreAccumulator;
use crate::pipeline::services::pose_scorer::{FrameDetection, PoseScorer};
use crate::pipeline::types::{AnalysisReport, DetectorOptions, FrameCoverage};
use crate::store::VideoReference;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Sampling, scoring and aggregation for a single video.
///
/// Built fresh for each job so that detector sessions are never shared.
pub struct AnalysisPipeline {
    decoder: Arc<dyn VideoDecoder>,
    sampler: FrameSampler,
    scorer: PoseScorer,
    options: DetectorOptions,
    metrics: PipelineMetrics,
}

impl AnalysisPipeline {
    pub fn new(
        decoder: Arc<dyn VideoDecoder>,
        sampler: FrameSampler,
        scorer: PoseScorer,
        options: DetectorOptions,
    ) -> Self {
        Self {
            decoder,
            sampler,
            scorer,
            options,
            metrics: PipelineMetrics::new(sampler.frame_count()),
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Runs the whole analysis and returns the report to store.
    ///
    /// Decode failures of single samples and transient detector failures
    /// skip the frame. The run fails when the video cannot be opened, when
    /// the detector is unavailable, or when every frame that reached the
    /// detector failed.
    #[instrument(skip(self, video), fields(public_id = %video.public_id))]
    pub async fn analyze(&mut self, video: &VideoReference) -> Result<AnalysisReport, PipelineError> {
        self.metrics = PipelineMetrics::new(self.sampler.frame_count());

        let started = Instant::now();
        self.scorer
            .configure(self.options)
            .await
            .map_err(PipelineError::Detection)?;
        self.metrics.record(PipelineStage::Configure, started.elapsed());

        let started = Instant::now();
        let session = self.decoder.open(video).await?;
        self.metrics.record(PipelineStage::Open, started.elapsed());
        debug!("Opened {} ({}ms)", video.url, session.duration().as_millis());

        let mut frames = self.sampler.sample(session);
        let mut accumulator = ScoreAccumulator::new();
        let mut last_failure: Option<DetectionError> = None;

        loop {
            let started = Instant::now();
            let Some(frame) = frames.next().await else {
                break;
            };
            self.metrics.record(PipelineStage::Decode, started.elapsed());
            self.metrics.frames_decoded += 1;

            let started = Instant::now();
            let detection = self.scorer.score(frame.clone()).await;
            self.metrics.record(PipelineStage::Detect, started.elapsed());

            match detection {
                Ok(FrameDetection::Scored(score)) => {
                    self.metrics.frames_scored += 1;
                    accumulator.push(score);
                }
                Ok(FrameDetection::NoPose) => {
                    self.metrics.frames_without_pose += 1;
                    debug!("No pose detected in frame {}", frame.index());
                }
                Err(e) if e.is_transient() => {
                    self.metrics.frames_failed += 1;
                    warn!("Skipping frame {}: {}", frame.index(), e);
                    last_failure = Some(e);
                }
                Err(e) => {
                    self.metrics.frames_failed += 1;
                    self.metrics.log_summary();
                    return Err(PipelineError::Detection(e));
                }
            }
        }
        drop(frames);

        if let Some(e) = last_failure
            && self.metrics.frames_failed == self.metrics.frames_detected()
        {
            self.metrics.log_summary();
            return Err(PipelineError::Detection(e));
        }

        let started = Instant::now();
        let result = accumulator.into_result();
        self.metrics.record(PipelineStage::Aggregate, started.elapsed());
        self.metrics.log_summary();

        info!(
            "Scored {}/{} sampled frames: {}",
            accumulator.count(),
            self.metrics.frames_decoded,
            result.score
        );

        Ok(AnalysisReport {
            result,
            coverage: FrameCoverage {
                sampled: self.metrics.frames_decoded,
                scored: accumulator.count(),
            },
        })
    }
}
