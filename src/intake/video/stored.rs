use super::ffmpeg::FfmpegExtractor;
use super::{DecodeSession, ImageSequenceDecoder, VideoDecoder, local_path};
use crate::config::VideoSettings;
use crate::error::DecodeError;
use crate::store::VideoReference;
use async_trait::async_trait;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageResult};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Opens whatever the ingestion sink stored under a `file://` URL.
///
/// - a directory is read as an image sequence
/// - an animated GIF or a still image is decoded in process
/// - any other file is split into frames with `ffmpeg` first
#[derive(Debug, Clone)]
pub struct StoredVideoDecoder {
    sequence: ImageSequenceDecoder,
    extractor: FfmpegExtractor,
    fps: f64,
}

impl StoredVideoDecoder {
    pub fn new(fps: f64, ffmpeg_program: impl Into<String>) -> Self {
        Self {
            sequence: ImageSequenceDecoder::new(fps),
            extractor: FfmpegExtractor::new(ffmpeg_program, fps),
            fps,
        }
    }

    pub fn from_settings(settings: &VideoSettings) -> Self {
        Self::new(settings.fps, settings.ffmpeg_program.clone())
    }

    async fn open_sequence(
        &self,
        video: &VideoReference,
        dir: &Path,
    ) -> Result<Box<dyn DecodeSession>, DecodeError> {
        let frames = VideoReference {
            url: format!("file://{}", dir.display()),
            ..video.clone()
        };
        self.sequence.open(&frames).await
    }
}

impl Default for StoredVideoDecoder {
    fn default() -> Self {
        Self::from_settings(&VideoSettings::default())
    }
}

#[async_trait]
impl VideoDecoder for StoredVideoDecoder {
    async fn open(&self, video: &VideoReference) -> Result<Box<dyn DecodeSession>, DecodeError> {
        let path = PathBuf::from(local_path(&video.url));
        let open_err = |e: std::io::Error| DecodeError::Open {
            url: video.url.clone(),
            reason: e.to_string(),
        };

        let meta = tokio::fs::metadata(&path).await.map_err(open_err)?;
        if meta.is_dir() {
            return self.sequence.open(video).await;
        }

        let mut head = [0u8; 64];
        let read = tokio::fs::File::open(&path)
            .await
            .map_err(open_err)?
            .read(&mut head)
            .await
            .map_err(open_err)?;

        match image::guess_format(&head[..read]) {
            Ok(format) => {
                debug!("Decoding {} as {:?}", path.display(), format);
                let bytes = tokio::fs::read(&path).await.map_err(open_err)?;
                let fps = self.fps;
                let decoded = tokio::task::spawn_blocking(move || decode_frames(bytes, format, fps))
                    .await
                    .map_err(|e| DecodeError::Open {
                        url: video.url.clone(),
                        reason: e.to_string(),
                    })?;
                let (frames, duration) = decoded.map_err(|e| DecodeError::Open {
                    url: video.url.clone(),
                    reason: e.to_string(),
                })?;
                info!("Opened {} with {} frames", path.display(), frames.len());
                AnimationSession::open(frames, duration)
            }
            Err(_) => {
                let dir = self.extractor.extract(&video.url, &path).await?;
                self.open_sequence(video, &dir).await
            }
        }
    }
}

/// A decoded frame and the offset it is first shown at.
struct TimedFrame {
    image: DynamicImage,
    start: Duration,
}

/// Decodes every frame up front, returning them with the clip's duration.
fn decode_frames(
    bytes: Vec<u8>,
    format: ImageFormat,
    fps: f64,
) -> ImageResult<(Vec<TimedFrame>, Duration)> {
    let frame_time = Duration::from_secs_f64(1.0 / fps);
    if format != ImageFormat::Gif {
        let image = image::load_from_memory_with_format(&bytes, format)?;
        let still = TimedFrame {
            image,
            start: Duration::ZERO,
        };
        return Ok((vec![still], frame_time));
    }

    let mut start = Duration::ZERO;
    let mut frames = Vec::new();
    for frame in GifDecoder::new(Cursor::new(bytes))?.into_frames() {
        let frame = frame?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let mut delay = Duration::from_micros(u64::from(numer) * 1_000 / u64::from(denom.max(1)));
        if delay.is_zero() {
            delay = frame_time;
        }
        frames.push(TimedFrame {
            image: DynamicImage::ImageRgba8(frame.into_buffer()),
            start,
        });
        start += delay;
    }
    Ok((frames, start))
}

/// Frames decoded up front, each shown from its start until the next one.
struct AnimationSession {
    frames: Vec<TimedFrame>,
    duration: Duration,
    closed: bool,
}

impl AnimationSession {
    fn open(
        frames: Vec<TimedFrame>,
        duration: Duration,
    ) -> Result<Box<dyn DecodeSession>, DecodeError> {
        if frames.is_empty() {
            return Err(DecodeError::NoFrames);
        }
        Ok(Box::new(Self {
            frames,
            duration,
            closed: false,
        }))
    }
}

#[async_trait]
impl DecodeSession for AnimationSession {
    fn duration(&self) -> Duration {
        self.duration
    }

    async fn frame_at(&mut self, offset: Duration) -> Result<DynamicImage, DecodeError> {
        let shown = self.frames.partition_point(|frame| frame.start <= offset);
        if shown == 0 || offset >= self.duration {
            return Err(DecodeError::OutOfRange {
                offset_ms: offset.as_millis(),
                duration_ms: self.duration().as_millis(),
            });
        }
        Ok(self.frames[shown - 1].image.clone())
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Released {} decoded frames", self.frames.len());
            self.frames.clear();
            self.closed = true;
        }
    }
}
