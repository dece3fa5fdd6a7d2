use crate::config::Settings;
use crate::intake::{FrameSampler, VideoDecoder};
use crate::pipeline::orchestration::AnalysisPipeline;
use crate::pipeline::services::detection::DetectorProvider;
use crate::pipeline::services::pose_scorer::PoseScorer;
use crate::pipeline::types::DetectorOptions;
use std::sync::Arc;
use std::time::Duration;

pub trait PipelineFactory: Send + Sync {
    fn build(&self) -> AnalysisPipeline;
}

/// Builds one pipeline per job from the shared decoder and a fresh detector session.
pub struct DefaultPipelineFactory {
    decoder: Arc<dyn VideoDecoder>,
    detectors: Arc<dyn DetectorProvider>,
    sampler: FrameSampler,
    options: DetectorOptions,
    frame_timeout: Option<Duration>,
}

impl DefaultPipelineFactory {
    pub fn new(decoder: Arc<dyn VideoDecoder>, detectors: Arc<dyn DetectorProvider>) -> Self {
        Self {
            decoder,
            detectors,
            sampler: FrameSampler::default(),
            options: DetectorOptions::default(),
            frame_timeout: None,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        decoder: Arc<dyn VideoDecoder>,
        detectors: Arc<dyn DetectorProvider>,
    ) -> Self {
        Self::new(decoder, detectors)
            .frame_count(settings.sampling.frame_count)
            .options(DetectorOptions::from(&settings.detector))
            .frame_timeout(settings.detector.frame_timeout())
    }

    pub fn frame_count(mut self, frame_count: usize) -> Self {
        self.sampler = FrameSampler::new(frame_count);
        self
    }

    pub fn options(mut self, options: DetectorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn frame_timeout(mut self, frame_timeout: Duration) -> Self {
        self.frame_timeout = Some(frame_timeout);
        self
    }
}

impl PipelineFactory for DefaultPipelineFactory {
    fn build(&self) -> AnalysisPipeline {
        let mut scorer = PoseScorer::builder(self.detectors.create());
        if let Some(frame_timeout) = self.frame_timeout {
            scorer = scorer.frame_timeout(frame_timeout);
        }
        AnalysisPipeline::new(
            self.decoder.clone(),
            self.sampler,
            scorer.build(),
            self.options,
        )
    }
}
