use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

/// One decoded sample of a video. Lives only between sampling and scoring.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    index: usize,
    offset: Duration,
    image: Arc<DynamicImage>,
}

impl VideoFrame {
    pub fn new(index: usize, offset: Duration, image: DynamicImage) -> Self {
        Self {
            index,
            offset,
            image: Arc::new(image),
        }
    }

    /// Position of this sample in the sampled sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Time offset of this sample from the start of the video.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let img: DynamicImage = DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(16, 16, Rgb([1, 2, 3])),
        );
        let f1 = VideoFrame::new(3, Duration::from_millis(300), img);
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
        assert_eq!(f2.index(), 3);
        assert_eq!(f2.dimensions(), (16, 16));
    }
}
