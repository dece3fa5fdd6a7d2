use super::{DecodeSession, VideoDecoder, local_path};
use crate::error::DecodeError;
use crate::store::VideoReference;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];
const FRAME_EPSILON: f64 = 1e-6;

/// Decodes a video stored as a directory of still frames at a fixed rate.
///
/// Frames are ordered by file name, so `0001.png`, `0002.png`, ... play in
/// sequence, which is what `ffmpeg -i clip.mp4 frames/%04d.png` produces.
#[derive(Debug, Clone)]
pub struct ImageSequenceDecoder {
    fps: f64,
}

impl ImageSequenceDecoder {
    pub fn new(fps: f64) -> Self {
        Self { fps }
    }
}

impl Default for ImageSequenceDecoder {
    fn default() -> Self {
        Self::new(30.0)
    }
}

#[async_trait]
impl VideoDecoder for ImageSequenceDecoder {
    async fn open(&self, video: &VideoReference) -> Result<Box<dyn DecodeSession>, DecodeError> {
        let dir = PathBuf::from(local_path(&video.url));
        if !(self.fps > 0.0) {
            return Err(DecodeError::Open {
                url: video.url.clone(),
                reason: format!("invalid frame rate {}", self.fps),
            });
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| DecodeError::Open {
                url: video.url.clone(),
                reason: e.to_string(),
            })?;

        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_frame_file(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(DecodeError::NoFrames);
        }
        frames.sort();

        info!(
            "Opened image sequence {} with {} frames at {} fps",
            dir.display(),
            frames.len(),
            self.fps
        );
        Ok(Box::new(ImageSequenceSession {
            frames,
            fps: self.fps,
            closed: false,
        }))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

struct ImageSequenceSession {
    frames: Vec<PathBuf>,
    fps: f64,
    closed: bool,
}

impl ImageSequenceSession {
    fn index_at(&self, offset: Duration) -> usize {
        // Offsets like 4.1s * 30fps land a hair below the whole frame number.
        (offset.as_secs_f64() * self.fps + FRAME_EPSILON).floor() as usize
    }
}

#[async_trait]
impl DecodeSession for ImageSequenceSession {
    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames.len() as f64 / self.fps)
    }

    async fn frame_at(&mut self, offset: Duration) -> Result<DynamicImage, DecodeError> {
        let index = self.index_at(offset);
        let path = self
            .frames
            .get(index)
            .cloned()
            .ok_or(DecodeError::OutOfRange {
                offset_ms: offset.as_millis(),
                duration_ms: self.duration().as_millis(),
            })?;

        let offset_ms = offset.as_millis();
        tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| DecodeError::CorruptFrame {
                offset_ms,
                reason: e.to_string(),
            })?
            .map_err(|e| DecodeError::CorruptFrame {
                offset_ms,
                reason: e.to_string(),
            })
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Released image sequence of {} frames", self.frames.len());
            self.closed = true;
        }
    }
}
