use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::AudioConfig;
use crate::error::PipelineError;
use crate::tools::run_tool;

/// Derives MP3 audio tracks from downloaded video containers
#[derive(Clone)]
pub struct AudioExtractor {
    ffmpeg: PathBuf,
    /// VBR quality for libmp3lame, 0 best .. 9 worst
    mp3_quality: u8,
}

impl AudioExtractor {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            mp3_quality: config.mp3_quality,
        }
    }

    /// Extract the audio stream of `video_path` into `audio_path`.
    ///
    /// Returns `Ok(Err(reason))` when ffmpeg rejects this file.
    pub async fn extract_mp3(
        &self,
        video_path: &Path,
        audio_path: &Path,
    ) -> Result<Result<(), String>, PipelineError> {
        if let Some(parent) = audio_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        info!("🎵 Extracting audio: {}", video_path.display());

        // Only a finished encode is renamed to `audio_path`
        let partial = partial_path(audio_path);
        let result = run_tool(self.ffmpeg.as_os_str(), self.ffmpeg_args(video_path, &partial)).await?;

        if let Err(reason) = result {
            discard(&partial).await;
            return Ok(Err(reason));
        }
        if !partial.is_file() {
            return Ok(Err(format!("ffmpeg did not create {}", partial.display())));
        }
        tokio::fs::rename(&partial, audio_path)
            .await
            .map_err(|e| PipelineError::io(audio_path, e))?;
        Ok(Ok(()))
    }

    fn ffmpeg_args(&self, video_path: &Path, audio_path: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            video_path.as_os_str().to_os_string(),
            "-vn".into(), // No video stream
            "-acodec".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            self.mp3_quality.to_string().into(),
            "-y".into(), // Overwrite a partial file left by an interrupted run
            audio_path.as_os_str().to_os_string(),
        ]
    }
}

/// `<id>.part.mp3` next to the final file; the extension keeps ffmpeg's muxer choice
pub(crate) fn partial_path(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("part.mp3")
}

/// Best-effort removal of a file left by a failed tool run
pub(crate) async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

/// Remove transient artifact directories. Missing directories are ignored.
pub async fn remove_dirs(dirs: &[&Path]) -> Result<(), PipelineError> {
    for dir in dirs {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!("🧹 Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", dir.display(), e);
                return Err(PipelineError::io(*dir, e));
            }
        }
    }
    Ok(())
}
