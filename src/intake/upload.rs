use crate::error::IngestError;
use crate::store::{SessionMetadata, VideoReference};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// A raw video handed over by a user, before anything is stored.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub user_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub metadata: SessionMetadata,
}

/// Local checks an upload must pass before it reaches the sink.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    max_bytes: u64,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn check(&self, upload: &VideoUpload) -> Result<(), IngestError> {
        let size = upload.bytes.len() as u64;
        if size == 0 {
            return Err(IngestError::Empty);
        }
        if size > self.max_bytes {
            return Err(IngestError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        let name = upload.file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(IngestError::UnsupportedFileName(upload.file_name.clone()));
        }
        Ok(())
    }
}

/// Durable storage for uploaded videos.
#[async_trait]
pub trait IngestionSink: Send + Sync {
    async fn store(&self, upload: &VideoUpload) -> Result<VideoReference, IngestError>;
}

/// Stores uploads under `<root>/<user>/<public_id>-<file_name>`.
#[derive(Debug, Clone)]
pub struct FileSystemSink {
    root: PathBuf,
}

impl FileSystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl IngestionSink for FileSystemSink {
    async fn store(&self, upload: &VideoUpload) -> Result<VideoReference, IngestError> {
        let public_id = Uuid::new_v4().simple().to_string();
        let user_dir = self.root.join(sanitize(&upload.user_id));
        tokio::fs::create_dir_all(&user_dir).await?;

        let path = user_dir.join(format!("{}-{}", public_id, upload.file_name));
        tokio::fs::write(&path, &upload.bytes).await?;
        info!(
            "Stored {} byte upload for {} at {}",
            upload.bytes.len(),
            upload.user_id,
            path.display()
        );

        Ok(VideoReference {
            url: format!("file://{}", path.display()),
            public_id,
            file_name: upload.file_name.clone(),
        })
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
