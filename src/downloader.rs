use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::audio::discard;
use crate::config::DownloaderConfig;
use crate::error::PipelineError;
use crate::models::{BatchOutcome, DiscoveredVideo, MediaAsset, MediaKind};
use crate::paths::BrandPaths;
use crate::tools::run_tool;

/// Fetches media streams for discovered videos through yt-dlp
pub struct MediaDownloader {
    yt_dlp: PathBuf,
    max_height: u32,
    cookies_file: Option<PathBuf>,
}

impl MediaDownloader {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            yt_dlp: config.yt_dlp_path.clone(),
            max_height: config.max_height,
            cookies_file: config.cookies_file.clone(),
        }
    }

    /// Download the video stream of every discovered video.
    ///
    /// Existing files are kept and not fetched again. Per-video failures are
    /// logged and skipped.
    pub async fn download_all(
        &self,
        videos: &[DiscoveredVideo],
        paths: &BrandPaths,
    ) -> Result<(Vec<MediaAsset>, BatchOutcome), PipelineError> {
        tokio::fs::create_dir_all(&paths.video_dir)
            .await
            .map_err(|e| PipelineError::io(&paths.video_dir, e))?;

        let mut outcome = BatchOutcome::new(videos.len());
        let mut assets = Vec::new();

        for (index, video) in videos.iter().enumerate() {
            let target = paths.video_file(&video.video_id);
            let asset = MediaAsset {
                video_id: video.video_id.clone(),
                kind: MediaKind::Video,
                path: target.clone(),
            };

            if target.exists() {
                info!("⏭️  [{}/{}] Already downloaded: {}", index + 1, videos.len(), target.display());
                outcome.skipped_existing += 1;
                assets.push(asset);
                continue;
            }

            info!("⬇️  [{}/{}] Downloading: {}", index + 1, videos.len(), video.title);

            match self.fetch(&self.video_args(&video.url, &target), &target).await? {
                Ok(()) => {
                    outcome.completed += 1;
                    assets.push(asset);
                }
                Err(reason) => {
                    warn!(video_id = %video.video_id, "Download failed: {}", reason);
                    outcome.record_failure(&video.video_id, reason);
                }
            }
        }

        info!(
            "✅ Downloads: {} new, {} already present, {} failed",
            outcome.completed,
            outcome.skipped_existing,
            outcome.failed.len()
        );
        Ok((assets, outcome))
    }

    /// Fetch an audio-only stream as `<target>` (an `.mp3` path).
    ///
    /// Returns `Ok(Err(reason))` when yt-dlp fails for this video.
    pub async fn download_audio(
        &self,
        video: &DiscoveredVideo,
        target: &Path,
    ) -> Result<Result<(), String>, PipelineError> {
        self.fetch(&self.audio_args(&video.url, target), target).await
    }

    /// A failed run never leaves a file at `target`, so the next run retries it
    async fn fetch(&self, args: &[OsString], target: &Path) -> Result<Result<(), String>, PipelineError> {
        match run_tool(self.yt_dlp.as_os_str(), args).await? {
            Ok(()) if target.exists() => Ok(Ok(())),
            Ok(()) => Ok(Err(format!(
                "yt-dlp reported success but {} was not created",
                target.display()
            ))),
            Err(reason) => {
                discard(target).await;
                Ok(Err(reason))
            }
        }
    }

    fn video_args(&self, url: &str, target: &Path) -> Vec<OsString> {
        let h = self.max_height;
        let format = format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best[height<={h}]"
        );

        let mut args: Vec<OsString> = vec![
            "-f".into(),
            format.into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "--no-progress".into(),
            "--output".into(),
            target.as_os_str().to_os_string(),
        ];
        self.push_common(&mut args, url);
        args
    }

    fn audio_args(&self, url: &str, target: &Path) -> Vec<OsString> {
        // yt-dlp appends the final extension itself after conversion
        let template = target.with_extension("%(ext)s");

        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--no-progress".into(),
            "--output".into(),
            template.into_os_string(),
        ];
        self.push_common(&mut args, url);
        args
    }

    fn push_common(&self, args: &mut Vec<OsString>, url: &str) {
        args.push("--extractor-args".into());
        args.push("youtube:player_client=default".into());

        if let Some(cookies) = self.cookies_file.as_ref().filter(|c| c.is_file()) {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_os_string());
        }

        args.push(url.into());
    }
}

/// Keep only rows whose video file exists in the brand's video directory
pub fn retain_downloaded(videos: Vec<DiscoveredVideo>, paths: &BrandPaths) -> Vec<DiscoveredVideo> {
    videos
        .into_iter()
        .filter(|v| paths.video_file(&v.video_id).is_file())
        .collect()
}
