pub mod ffmpeg;
pub mod image_sequence;
pub mod stored;

pub use ffmpeg::FfmpegExtractor;
pub use image_sequence::ImageSequenceDecoder;
pub use stored::StoredVideoDecoder;

use crate::error::DecodeError;
use crate::store::VideoReference;
use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;
use tracing::debug;

/// An open, stateful decode session over one video.
#[async_trait]
pub trait DecodeSession: Send {
    fn duration(&self) -> Duration;

    /// Seeks to `offset` and decodes the frame shown there.
    async fn frame_at(&mut self, offset: Duration) -> Result<DynamicImage, DecodeError>;

    /// Releases decoder resources. Called exactly once.
    fn close(&mut self);
}

/// Opens decode sessions for stored videos.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, video: &VideoReference) -> Result<Box<dyn DecodeSession>, DecodeError>;
}

/// Owns a decode session and closes it when dropped.
pub struct SessionGuard {
    session: Box<dyn DecodeSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn DecodeSession>) -> Self {
        Self { session }
    }

    pub fn duration(&self) -> Duration {
        self.session.duration()
    }

    pub async fn frame_at(&mut self, offset: Duration) -> Result<DynamicImage, DecodeError> {
        self.session.frame_at(offset).await
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!("Closing decode session");
        self.session.close();
    }
}

/// Turns a `file://` URL (or a bare path) into a filesystem path.
pub fn local_path(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}
