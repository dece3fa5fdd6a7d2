pub mod sampler;
pub mod upload;
pub mod video;

pub use sampler::FrameSampler;
pub use upload::{FileSystemSink, IngestionSink, UploadPolicy, VideoUpload};
pub use video::{
    DecodeSession, FfmpegExtractor, ImageSequenceDecoder, SessionGuard, StoredVideoDecoder,
    VideoDecoder,
};
