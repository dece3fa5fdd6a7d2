use crate::store::job::JobStatus;
use thiserror::Error;
use uuid::Uuid;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ingest Error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Store Error: {0}")]
    Store(#[from] StoreError),
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Coordinator Error: {0}")]
    Coordinator(String),
}

/// Rejections raised before any job record exists.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Video is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Video upload is empty")]
    Empty,
    #[error("Unsupported file name: {0}")]
    UnsupportedFileName(String),
    #[error("Failed to store video: {0}")]
    Sink(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open video {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("Offset {offset_ms}ms is outside the video ({duration_ms}ms)")]
    OutOfRange { offset_ms: u128, duration_ms: u128 },
    #[error("Corrupt frame at {offset_ms}ms: {reason}")]
    CorruptFrame { offset_ms: u128, reason: String },
    #[error("Video contains no frames")]
    NoFrames,
    #[error("Decode IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// The frame could not be processed this time; the next frame may succeed.
    #[error("Transient detection failure: {0}")]
    Transient(String),
    /// The capability cannot be reached at all for this job.
    #[error("Pose detection unavailable: {0}")]
    Unavailable(String),
    #[error("Pose detection timed out")]
    Timeout,
}

impl DetectionError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, DetectionError::Unavailable(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Analysis job {0} not found")]
    NotFound(Uuid),
    #[error("Analysis job {0} already exists")]
    AlreadyExists(Uuid),
    #[error("Analysis job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a write that failed with this error is worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Job-level failures. Each maps to exactly one terminal `failed` write.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("video could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("pose detection failed for the whole video: {0}")]
    Detection(DetectionError),
    #[error("analysis timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
