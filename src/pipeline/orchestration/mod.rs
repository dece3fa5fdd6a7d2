pub mod analysis_pipeline;
pub mod retry;
pub mod worker;

pub use analysis_pipeline::AnalysisPipeline;
pub use retry::RetryPolicy;
pub use worker::AnalysisWorker;
