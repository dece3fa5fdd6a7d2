use crate::common::VideoFrame;
use crate::error::DetectionError;
use crate::pipeline::services::detection::PoseDetector;
use crate::pipeline::types::{DetectorOptions, FrameScore, PoseLandmarkSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Mutex;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::util::BoxService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::debug;

/// Score lost per unit of horizontal shoulder/hip offset.
pub const ALIGNMENT_PENALTY: f64 = 500.0;

/// Horizontal offset between left shoulder and left hip.
pub fn alignment_diff(landmarks: &PoseLandmarkSet) -> f64 {
    (landmarks.left_shoulder().x - landmarks.left_hip().x).abs()
}

/// `max(0, 100 - alignment_diff * 500)`
pub fn frame_score(landmarks: &PoseLandmarkSet) -> FrameScore {
    score_for_alignment(alignment_diff(landmarks))
}

pub fn score_for_alignment(alignment_diff: f64) -> FrameScore {
    FrameScore::new((FrameScore::MAX - alignment_diff * ALIGNMENT_PENALTY).max(FrameScore::MIN))
}

/// What scoring a single frame produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDetection {
    Scored(FrameScore),
    /// The detector found no body; the frame takes no part in aggregation.
    NoPose,
}

type SharedDetector = Arc<Mutex<Box<dyn PoseDetector>>>;

/// Submits frames to the detector and scores the landmarks it returns.
#[derive(Clone)]
pub struct PoseScoringService {
    detector: SharedDetector,
}

impl PoseScoringService {
    fn new(detector: SharedDetector) -> Self {
        Self { detector }
    }
}

impl Service<VideoFrame> for PoseScoringService {
    type Response = FrameDetection;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: VideoFrame) -> Self::Future {
        let detector = self.detector.clone();
        Box::pin(async move {
            let mut detector = detector.lock().await;
            let detection = match detector.detect(&frame).await? {
                Some(landmarks) => FrameDetection::Scored(frame_score(&landmarks)),
                None => FrameDetection::NoPose,
            };
            debug!("Frame {} scored: {:?}", frame.index(), detection);
            Ok::<_, BoxError>(detection)
        })
    }
}

pub struct PoseScorerBuilder {
    detector: Box<dyn PoseDetector>,
    frame_timeout: Option<Duration>,
}

impl PoseScorerBuilder {
    pub fn frame_timeout(mut self, frame_timeout: Duration) -> Self {
        self.frame_timeout = Some(frame_timeout);
        self
    }

    pub fn build(self) -> PoseScorer {
        let detector: SharedDetector = Arc::new(Mutex::new(self.detector));
        let service = ServiceBuilder::new()
            .option_layer(self.frame_timeout.map(TimeoutLayer::new))
            .concurrency_limit(1)
            .service(PoseScoringService::new(detector.clone()));

        PoseScorer {
            detector,
            service: BoxService::new(service),
        }
    }
}

/// Per-run scoring front end: one detector session, frames in sequence.
pub struct PoseScorer {
    detector: SharedDetector,
    service: BoxService<VideoFrame, FrameDetection, BoxError>,
}

impl PoseScorer {
    pub fn builder(detector: Box<dyn PoseDetector>) -> PoseScorerBuilder {
        PoseScorerBuilder {
            detector,
            frame_timeout: None,
        }
    }

    pub async fn configure(&self, options: DetectorOptions) -> Result<(), DetectionError> {
        self.detector.lock().await.configure(options).await
    }

    pub async fn score(&mut self, frame: VideoFrame) -> Result<FrameDetection, DetectionError> {
        let service = self.service.ready().await.map_err(into_detection_error)?;
        service.call(frame).await.map_err(into_detection_error)
    }
}

fn into_detection_error(err: BoxError) -> DetectionError {
    if err.is::<Elapsed>() {
        return DetectionError::Timeout;
    }
    match err.downcast::<DetectionError>() {
        Ok(err) => *err,
        Err(other) => DetectionError::Transient(other.to_string()),
    }
}
