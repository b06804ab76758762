use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use medley_core::AppError;
use tokio::process::Command;
use uuid::Uuid;

/// Result of re-encoding an image.
#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub stored_file_name: String,
    pub output_path: PathBuf,
}

/// Result of re-encoding a video; always carries a thumbnail.
#[derive(Debug, Clone)]
pub struct VideoOutput {
    pub stored_file_name: String,
    pub output_path: PathBuf,
    pub thumbnail_path: PathBuf,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn process_image(
        &self,
        input: &Path,
        original_file_name: &str,
    ) -> Result<ImageOutput, AppError>;

    async fn process_video(
        &self,
        input: &Path,
        original_file_name: &str,
    ) -> Result<VideoOutput, AppError>;
}

/// Transcoder backed by the ffmpeg binary.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    processed_dir: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: String, processed_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        // The binary path ends up on a command line; refuse anything that
        // could smuggle shell metacharacters in from the environment.
        if !ffmpeg_path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'))
        {
            return Err(AppError::Validation(format!(
                "ffmpeg path contains unsafe characters: {}",
                ffmpeg_path
            )));
        }

        Ok(Self {
            ffmpeg_path,
            processed_dir: processed_dir.into(),
        })
    }

    async fn run_ffmpeg(&self, args: Vec<OsString>) -> Result<(), AppError> {
        let start = std::time::Instant::now();
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                AppError::Transcode(format!("Failed to execute {}: {}", self.ffmpeg_path, e))
            })?;

        if !output.status.success() {
            return Err(AppError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "ffmpeg invocation completed"
        );
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "image_webp"))]
    async fn process_image(
        &self,
        input: &Path,
        original_file_name: &str,
    ) -> Result<ImageOutput, AppError> {
        let stored_file_name = image_stored_name(original_file_name);
        let output_path = self.processed_dir.join(&stored_file_name);

        self.run_ffmpeg(image_webp_args(input, &output_path)).await?;

        tracing::info!(output = %output_path.display(), "Image re-encoded");
        Ok(ImageOutput {
            stored_file_name,
            output_path,
        })
    }

    #[tracing::instrument(skip(self), fields(ffmpeg.operation = "video_compress"))]
    async fn process_video(
        &self,
        input: &Path,
        original_file_name: &str,
    ) -> Result<VideoOutput, AppError> {
        let stored_file_name = video_stored_name(original_file_name);
        let output_path = self.processed_dir.join(&stored_file_name);
        let thumbnail_path = self
            .processed_dir
            .join(format!("{}_thumb.webp", stored_file_name));

        self.run_ffmpeg(video_compress_args(input, &output_path))
            .await?;
        // Thumbnail is taken from the compressed output, one frame at t=1s.
        self.run_ffmpeg(thumbnail_args(&output_path, &thumbnail_path))
            .await?;

        tracing::info!(
            output = %output_path.display(),
            thumbnail = %thumbnail_path.display(),
            "Video re-encoded"
        );
        Ok(VideoOutput {
            stored_file_name,
            output_path,
            thumbnail_path,
        })
    }
}

/// `{uuid}_{original}` — keeps the container extension.
fn video_stored_name(original_file_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), original_file_name)
}

/// `{uuid}_{stem}.webp` — the original extension is replaced.
fn image_stored_name(original_file_name: &str) -> String {
    let stem = Path::new(original_file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_file_name);
    format!("{}_{}.webp", Uuid::new_v4(), stem)
}

fn video_compress_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        "25".into(),
        "-preset".into(),
        "fast".into(),
        output.into(),
    ]
}

fn thumbnail_args(input: &Path, thumbnail: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-ss".into(),
        "00:00:01".into(),
        "-vframes".into(),
        "1".into(),
        "-vf".into(),
        "scale=320:-1".into(),
        "-c:v".into(),
        "libwebp".into(),
        "-quality".into(),
        "80".into(),
        thumbnail.into(),
    ]
}

fn image_webp_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c:v".into(),
        "libwebp".into(),
        "-quality".into(),
        "80".into(),
        output.into(),
    ]
}
