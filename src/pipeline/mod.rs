pub mod context;
pub mod orchestration;
pub mod pipeline_factory;
pub mod services;
pub mod types;

pub use orchestration::{AnalysisPipeline, AnalysisWorker, RetryPolicy};
pub use pipeline_factory::{DefaultPipelineFactory, PipelineFactory};
pub use services::{DetectorProvider, PoseDetector, PoseScorer, RecordedPoseDetector};
pub use types::{AnalysisReport, AnalysisResult, DetectorOptions, FrameCoverage, PoseLandmarkSet};
