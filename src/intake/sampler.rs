use crate::common::VideoFrame;
use crate::intake::video::{DecodeSession, SessionGuard};
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_FRAME_COUNT: usize = 10;

/// Pulls a fixed number of evenly spaced frames out of a decode session.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    frame_count: usize,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_COUNT)
    }
}

impl FrameSampler {
    pub fn new(frame_count: usize) -> Self {
        Self { frame_count }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Offset of sample `index` out of `count` for a video of `duration`.
    pub fn offset_of(duration: Duration, index: usize, count: usize) -> Duration {
        if count == 0 {
            return Duration::ZERO;
        }
        let nanos = duration.as_nanos() * index as u128 / count as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Lazily decodes frames at `duration * i / N` for `i = 0..N`.
    ///
    /// Samples that fail to decode are skipped. The session is consumed and
    /// closed when the stream ends or is dropped.
    pub fn sample(&self, session: Box<dyn DecodeSession>) -> BoxStream<'static, VideoFrame> {
        let guard = SessionGuard::new(session);
        let count = self.frame_count;
        let duration = guard.duration();
        debug!(
            "Sampling {} frames from a {}ms video",
            count,
            duration.as_millis()
        );

        stream::unfold((guard, 0usize), move |(mut guard, mut index)| async move {
            while index < count {
                let offset = Self::offset_of(duration, index, count);
                let sample_index = index;
                index += 1;

                match guard.frame_at(offset).await {
                    Ok(image) => {
                        let frame = VideoFrame::new(sample_index, offset, image);
                        return Some((frame, (guard, index)));
                    }
                    Err(e) => {
                        warn!("Skipping sample {} at {}ms: {}", sample_index, offset.as_millis(), e);
                    }
                }
            }
            None
        })
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DecodeError;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory session that fails at chosen sample offsets.
    pub(crate) struct ScriptedSession {
        pub duration: Duration,
        pub broken_offsets: HashSet<Duration>,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedSession {
        pub(crate) fn healthy(duration: Duration) -> Self {
            Self {
                duration,
                broken_offsets: HashSet::new(),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl DecodeSession for ScriptedSession {
        fn duration(&self) -> Duration {
            self.duration
        }

        async fn frame_at(&mut self, offset: Duration) -> Result<DynamicImage, DecodeError> {
            if self.broken_offsets.contains(&offset) {
                return Err(DecodeError::CorruptFrame {
                    offset_ms: offset.as_millis(),
                    reason: "bad block".to_string(),
                });
            }
            Ok(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
                4,
                4,
                Rgb([0u8, 0, 0]),
            )))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn offsets_are_evenly_spaced() {
        let duration = Duration::from_secs(5);
        let offsets: Vec<u128> = (0..10)
            .map(|i| FrameSampler::offset_of(duration, i, 10).as_millis())
            .collect();
        assert_eq!(
            offsets,
            vec![0, 500, 1000, 1500, 2000, 2500, 3000, 3500, 4000, 4500]
        );
    }

    #[tokio::test]
    async fn yields_ordered_samples_and_closes_session() {
        let session = ScriptedSession::healthy(Duration::from_secs(10));
        let closes = session.closes.clone();

        let frames: Vec<VideoFrame> = FrameSampler::default()
            .sample(Box::new(session))
            .collect()
            .await;

        assert_eq!(frames.len(), 10);
        let indexes: Vec<usize> = frames.iter().map(|f| f.index()).collect();
        assert_eq!(indexes, (0..10).collect::<Vec<_>>());
        assert_eq!(frames[3].offset(), Duration::from_secs(3));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_undecodable_samples() {
        let mut session = ScriptedSession::healthy(Duration::from_secs(10));
        session.broken_offsets.insert(Duration::from_secs(2));
        session.broken_offsets.insert(Duration::from_secs(7));

        let frames: Vec<VideoFrame> = FrameSampler::default()
            .sample(Box::new(session))
            .collect()
            .await;

        let indexes: Vec<usize> = frames.iter().map(|f| f.index()).collect();
        assert_eq!(indexes, vec![0, 1, 3, 4, 5, 6, 8, 9]);
    }

    #[tokio::test]
    async fn dropping_the_stream_early_releases_session() {
        let session = ScriptedSession::healthy(Duration::from_secs(10));
        let closes = session.closes.clone();

        let mut frames = FrameSampler::default().sample(Box::new(session));
        assert!(frames.next().await.is_some());
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        drop(frames);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
