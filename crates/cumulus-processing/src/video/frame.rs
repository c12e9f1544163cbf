//! Frame extraction via an external ffmpeg process

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Pulls a single still out of a video.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Frame `frame_index` of the video at `source`, encoded as one JPEG.
    async fn extract_frame(&self, source: &Path, frame_index: u32) -> Result<Vec<u8>>;
}

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        validate_path(&ffmpeg_path).context("Invalid ffmpeg_path: contains dangerous characters")?;

        if ffmpeg_path.is_empty()
            || !ffmpeg_path.chars().all(|c| {
                c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
            })
        {
            return Err(anyhow!("Invalid ffmpeg_path: contains unsafe characters"));
        }

        Ok(Self { ffmpeg_path })
    }

    fn args(source: &Path, frame_index: u32) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("select=gte(n\\,{})", frame_index),
            "-vframes".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    #[tracing::instrument(skip(self), fields(
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "extract_frame"
    ))]
    async fn extract_frame(&self, source: &Path, frame_index: u32) -> Result<Vec<u8>> {
        let start = std::time::Instant::now();

        let output = Command::new(&self.ffmpeg_path)
            .args(Self::args(source, frame_index))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("FFmpeg failed: {}", stderr.trim()));
        }
        if output.stdout.is_empty() {
            return Err(anyhow!("FFmpeg produced no frame"));
        }

        tracing::debug!(
            size_bytes = output.stdout.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video frame extracted"
        );
        Ok(output.stdout)
    }
}
