use crate::error::DecodeError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Splits a container file into numbered PNG frames with an external `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: String,
    fps: f64,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<String>, fps: f64) -> Self {
        Self {
            program: program.into(),
            fps,
        }
    }

    /// Directory the frames of `video` are extracted into, next to the file itself.
    pub fn frames_dir(video: &Path) -> PathBuf {
        let mut name = video.file_name().unwrap_or_default().to_os_string();
        name.push(".frames");
        video.with_file_name(name)
    }

    fn args(&self, video: &Path, out_dir: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vf".to_string(),
            format!("fps={}", self.fps),
            out_dir.join("%05d.png").display().to_string(),
        ]
    }

    /// Extracts frames once and reuses them on later opens.
    pub async fn extract(&self, url: &str, video: &Path) -> Result<PathBuf, DecodeError> {
        let out_dir = Self::frames_dir(video);
        if has_entries(&out_dir).await {
            debug!("Reusing extracted frames in {}", out_dir.display());
            return Ok(out_dir);
        }

        tokio::fs::create_dir_all(&out_dir).await?;
        let output = Command::new(&self.program)
            .args(self.args(video, &out_dir))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DecodeError::Open {
                url: url.to_string(),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            // A half-written directory would be picked up as cached frames.
            let _ = tokio::fs::remove_dir_all(&out_dir).await;
            return Err(DecodeError::Open {
                url: url.to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        info!("Extracted frames of {} into {}", video.display(), out_dir.display());
        Ok(out_dir)
    }
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}
