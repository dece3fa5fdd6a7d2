pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod store;
pub mod watcher;

pub use config::Settings;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, DecodeError, DetectionError, IngestError, PipelineError, StoreError};

pub use pipeline::{AnalysisReport, AnalysisResult};
pub use store::{AnalysisJob, JobStatus, JobStore};
pub use watcher::{JobStatusWatcher, WatchEvent, WatchOutcome};
