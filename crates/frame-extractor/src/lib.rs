//! Frame extraction module
//!
//! Turns one source video into ordered batches of per-second still frames.
//! The decoder is the external ffmpeg CLI invoked as a black box: video
//! in, sequentially numbered PNG files out. Frames are uploaded to the
//! image bucket and only their keys travel through the rest of the
//! pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use video_narrative_common::{FrameBatch, SequenceId, VideoSource};
use video_narrative_storage::ObjectStorage;

/// Frame extraction errors. All of them are fatal to the run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to download video: {0}")]
    Download(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Failed to upload frame: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of frame batches for one video.
///
/// The production implementation shells out to ffmpeg; tests drive the
/// orchestrator through stubs of this trait.
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync {
    async fn extract(&self, video: &VideoSource) -> Result<Vec<FrameBatch>, ExtractError>;
}

/// Frame extractor configuration
#[derive(Debug, Clone)]
pub struct FrameExtractorConfig {
    /// Frames sampled per second of video
    pub fps: u32,
    /// Maximum frames per batch (the downstream model's per-call image limit)
    pub batch_size: usize,
}

impl Default for FrameExtractorConfig {
    fn default() -> Self {
        Self {
            fps: 1,
            batch_size: 20,
        }
    }
}

/// Frame extractor backed by the ffmpeg CLI
pub struct FfmpegFrameExtractor {
    videos: Arc<dyn ObjectStorage>,
    images: Arc<dyn ObjectStorage>,
    config: FrameExtractorConfig,
}

impl FfmpegFrameExtractor {
    #[must_use]
    pub fn new(
        videos: Arc<dyn ObjectStorage>,
        images: Arc<dyn ObjectStorage>,
        config: FrameExtractorConfig,
    ) -> Self {
        Self {
            videos,
            images,
            config,
        }
    }

    /// Decode `video_path` into one PNG per sampled second under
    /// `frames_dir`. Filenames are zero-padded so lexicographic order
    /// equals temporal order.
    async fn run_ffmpeg(&self, video_path: &Path, frames_dir: &Path) -> Result<(), ExtractError> {
        let output_pattern = frames_dir.join("%05d.png");
        let video_path_str = video_path
            .to_str()
            .ok_or_else(|| ExtractError::Ffmpeg("Invalid video path".to_string()))?;
        let output_pattern_str = output_pattern
            .to_str()
            .ok_or_else(|| ExtractError::Ffmpeg("Invalid output path".to_string()))?;

        let output = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                video_path_str,
                "-vf",
                &format!("fps={}", self.config.fps),
                output_pattern_str,
            ])
            .output()
            .await
            .map_err(|e| ExtractError::Ffmpeg(format!("Failed to execute ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ffmpeg(format!("FFmpeg failed: {stderr}")));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameSource for FfmpegFrameExtractor {
    async fn extract(&self, video: &VideoSource) -> Result<Vec<FrameBatch>, ExtractError> {
        // Scratch space is dropped on every exit path, success or failure
        let scratch = tempfile::tempdir()?;
        let video_path = scratch.path().join("video.mp4");
        let frames_dir = scratch.path().join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;

        debug!("Downloading video object '{}'", video.object_key);
        self.videos
            .retrieve_file_to_path(&video.object_key, &video_path)
            .await
            .map_err(|e| ExtractError::Download(e.to_string()))?;

        self.run_ffmpeg(&video_path, &frames_dir).await?;

        let frame_files = collect_frame_files(&frames_dir)?;
        info!(
            "Extracted {} still frames from video '{}'",
            frame_files.len(),
            video.id
        );

        // Frames live under the video's own key prefix in the image bucket
        for filename in &frame_files {
            let key = format!("{}/{}", video.object_key, filename);
            self.images
                .store_file_from_path(&key, &frames_dir.join(filename))
                .await
                .map_err(|e| ExtractError::Upload(e.to_string()))?;
        }

        Ok(partition_frames(
            video,
            &video.object_key,
            &frame_files,
            self.config.batch_size,
        ))
    }
}

/// List the PNG frame files of a decode run in temporal order
pub fn collect_frame_files(frames_dir: &Path) -> Result<Vec<String>, ExtractError> {
    let mut files: Vec<String> = std::fs::read_dir(frames_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path: &PathBuf| path.extension().and_then(|s| s.to_str()) == Some("png"))
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect();

    // Zero-padded names: alphabetical order is sequential order
    files.sort();
    Ok(files)
}

/// Partition ordered frame files into consecutive batches of at most
/// `batch_size`, assigning `sequence-<k+1>` to the k-th chunk.
#[must_use]
pub fn partition_frames(
    video: &VideoSource,
    image_path: &str,
    frames: &[String],
    batch_size: usize,
) -> Vec<FrameBatch> {
    frames
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(k, chunk)| FrameBatch {
            video: video.clone(),
            sequence_id: SequenceId::new(k as u32 + 1),
            image_path: image_path.to_string(),
            image_keys: chunk.to_vec(),
        })
        .collect()
}
