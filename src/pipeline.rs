//! Stage dispatcher: runs the named stages in dependency order.

use std::fmt;
use tracing::{info, warn};

use crate::analysis::ReportGenerator;
use crate::audio::{remove_dirs, AudioExtractor};
use crate::comments::CommentExtractor;
use crate::config::{Config, Credentials};
use crate::crawler::VideoDiscovery;
use crate::downloader::{retain_downloaded, MediaDownloader};
use crate::error::PipelineError;
use crate::llm::create_llm;
use crate::models::{BatchOutcome, DiscoveredVideo, MediaAsset, MediaKind, RawComment, Report};
use crate::paths::BrandPaths;
use crate::tables::{require_table, write_table};
use crate::transcription::WhisperTranscriber;
use crate::youtube::YouTubeClient;

const DISCOVERED_TABLE: &str = "discovered-videos table";
const COMMENTS_TABLE: &str = "raw-comments table";

/// A named pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Crawl,
    Download,
    Comments,
    Audio,
    Analyze,
    /// Every stage above, in order
    All,
    #[value(skip)]
    Prune,
}

impl Stage {
    /// Concrete stages to execute for this request
    pub fn sequence(self) -> Vec<Stage> {
        match self {
            Stage::All => vec![
                Stage::Crawl,
                Stage::Download,
                Stage::Comments,
                Stage::Audio,
                Stage::Analyze,
            ],
            stage => vec![stage],
        }
    }

    pub fn needs_youtube(self) -> bool {
        matches!(self, Stage::Crawl | Stage::Comments)
    }

    pub fn needs_ai(self) -> bool {
        matches!(self, Stage::Analyze)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Crawl => "crawl",
            Stage::Download => "download",
            Stage::Comments => "comments",
            Stage::Audio => "audio",
            Stage::Analyze => "analyze",
            Stage::All => "all",
            Stage::Prune => "prune",
        };
        f.write_str(name)
    }
}

/// Typed result of one stage
#[derive(Debug)]
pub enum StageOutcome {
    Crawled { videos: usize },
    Downloaded { assets: Vec<MediaAsset>, outcome: BatchOutcome },
    Comments { rows: usize, outcome: BatchOutcome },
    Audio { assets: Vec<MediaAsset>, outcome: BatchOutcome },
    Analyzed(Report),
    Pruned { kept: usize, removed: usize },
}

/// Owns the run's configuration, secrets and brand paths
pub struct Pipeline {
    config: Config,
    credentials: Credentials,
    paths: BrandPaths,
}

impl Pipeline {
    pub fn new(config: Config, credentials: Credentials) -> Result<Self, PipelineError> {
        config.validate()?;
        let paths = BrandPaths::from_config(&config);
        Ok(Self {
            config,
            credentials,
            paths,
        })
    }

    pub fn paths(&self) -> &BrandPaths {
        &self.paths
    }

    /// Run `stage` (or every stage for `all`).
    ///
    /// Secrets for every stage in the sequence are checked before the first
    /// one starts.
    pub async fn run(&self, stage: Stage) -> Result<Vec<StageOutcome>, PipelineError> {
        let sequence = stage.sequence();

        if sequence.iter().any(|s| s.needs_youtube()) {
            self.credentials.require_youtube()?;
        }
        if sequence.iter().any(|s| s.needs_ai()) {
            self.credentials.require_ai(&self.config.llm)?;
        }

        info!("🚀 Brand '{}' → {}", self.paths.brand, self.paths.root.display());

        let mut outcomes = Vec::with_capacity(sequence.len());
        for step in sequence {
            info!("▶️  Stage: {}", step);
            let outcome = self.run_stage(step).await?;
            log_outcome(step, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_stage(&self, stage: Stage) -> Result<StageOutcome, PipelineError> {
        match stage {
            Stage::Crawl => self.crawl().await,
            Stage::Download => self.download().await,
            Stage::Comments => self.comments().await,
            Stage::Audio => self.audio().await,
            Stage::Analyze => self.analyze().await,
            Stage::Prune => self.prune_to_downloaded(),
            Stage::All => Err(PipelineError::Configuration(
                "`all` is not a concrete stage".to_string(),
            )),
        }
    }

    fn youtube_client(&self) -> Result<YouTubeClient, PipelineError> {
        let key = self.credentials.require_youtube()?;
        YouTubeClient::with_base_url(
            key,
            self.config.youtube.timeout_seconds,
            &self.config.youtube.api_base_url,
        )
        .map_err(|e| PipelineError::Configuration(e.to_string()))
    }

    fn discovered(&self, stage: Stage) -> Result<Vec<DiscoveredVideo>, PipelineError> {
        require_table(stage, DISCOVERED_TABLE, Stage::Crawl, &self.paths.discovered_videos)
    }

    async fn crawl(&self) -> Result<StageOutcome, PipelineError> {
        let client = self.youtube_client()?;
        let query = self.config.search_query();
        let discovery = VideoDiscovery::new(
            &client,
            self.config.crawler.max_search_pages,
            self.config.crawler.region_code.clone(),
        );

        let videos = discovery.discover(&query).await?;
        write_table(&self.paths.discovered_videos, &videos)?;
        info!(
            "💾 Saved {} videos to {}",
            videos.len(),
            self.paths.discovered_videos.display()
        );

        Ok(StageOutcome::Crawled {
            videos: videos.len(),
        })
    }

    async fn download(&self) -> Result<StageOutcome, PipelineError> {
        let videos = self.discovered(Stage::Download)?;
        let downloader = MediaDownloader::new(&self.config.downloader);
        let (assets, outcome) = downloader.download_all(&videos, &self.paths).await?;
        Ok(StageOutcome::Downloaded { assets, outcome })
    }

    async fn comments(&self) -> Result<StageOutcome, PipelineError> {
        let videos = self.discovered(Stage::Comments)?;
        let client = self.youtube_client()?;
        let extractor = CommentExtractor::new(&client, &self.config.comments);

        let (rows, outcome) = extractor.extract_all(&videos).await?;
        write_table(&self.paths.raw_comments, &rows)?;
        info!(
            "💾 Saved {} comments to {}",
            rows.len(),
            self.paths.raw_comments.display()
        );

        Ok(StageOutcome::Comments {
            rows: rows.len(),
            outcome,
        })
    }

    /// Derive audio from downloaded video where possible, otherwise fetch an
    /// audio-only stream; then optionally transcribe.
    async fn audio(&self) -> Result<StageOutcome, PipelineError> {
        let videos = self.discovered(Stage::Audio)?;
        let extractor = AudioExtractor::new(&self.config.audio);
        let downloader = MediaDownloader::new(&self.config.downloader);

        tokio::fs::create_dir_all(&self.paths.audio_dir)
            .await
            .map_err(|e| PipelineError::io(&self.paths.audio_dir, e))?;

        let mut outcome = BatchOutcome::new(videos.len());
        let mut assets = Vec::new();

        for (index, video) in videos.iter().enumerate() {
            let audio_path = self.paths.audio_file(&video.video_id);

            if audio_path.exists() {
                info!("⏭️  [{}/{}] Audio already present: {}", index + 1, videos.len(), audio_path.display());
                outcome.skipped_existing += 1;
            } else {
                let video_path = self.paths.video_file(&video.video_id);
                let result = if video_path.is_file() {
                    extractor.extract_mp3(&video_path, &audio_path).await?
                } else {
                    info!("🎧 [{}/{}] Fetching audio stream: {}", index + 1, videos.len(), video.title);
                    downloader.download_audio(video, &audio_path).await?
                };

                if let Err(reason) = result {
                    warn!(video_id = %video.video_id, "Audio failed: {}", reason);
                    outcome.record_failure(&video.video_id, reason);
                    continue;
                }
                outcome.completed += 1;
            }

            assets.push(MediaAsset {
                video_id: video.video_id.clone(),
                kind: MediaKind::Audio,
                path: audio_path,
            });
        }

        if self.config.audio.transcribe {
            self.transcribe(&assets, &mut outcome).await?;
        }

        Ok(StageOutcome::Audio { assets, outcome })
    }

    async fn transcribe(&self, assets: &[MediaAsset], outcome: &mut BatchOutcome) -> Result<(), PipelineError> {
        let transcriber = WhisperTranscriber::new(&self.config.audio);

        for asset in assets {
            if self.paths.transcript_file(&asset.video_id).exists() {
                continue;
            }
            if let Err(reason) = transcriber
                .transcribe(&asset.path, &self.paths.transcripts_dir)
                .await?
            {
                warn!(video_id = %asset.video_id, "Transcription failed: {}", reason);
                outcome.record_failure(&asset.video_id, format!("transcription: {}", reason));
            }
        }
        Ok(())
    }

    async fn analyze(&self) -> Result<StageOutcome, PipelineError> {
        let videos = self.discovered(Stage::Analyze)?;
        let comments: Vec<RawComment> = require_table(
            Stage::Analyze,
            COMMENTS_TABLE,
            Stage::Comments,
            &self.paths.raw_comments,
        )?;

        let key = self
            .credentials
            .require_ai(&self.config.llm)?
            .to_string();
        let key = (!key.is_empty()).then_some(key);

        let build = |model: &str| {
            create_llm(&self.config.llm_for_model(model, key.clone()))
                .map_err(|e| PipelineError::Configuration(format!("{:#}", e)))
        };
        let batch_llm = build(&self.config.analysis.batch_model)?;
        let synthesis_llm = build(&self.config.analysis.synthesis_model)?;

        let generator = ReportGenerator::new(
            &self.config.analysis,
            &self.paths,
            batch_llm.as_ref(),
            synthesis_llm.as_ref(),
        );
        let report = generator.generate(&videos, &comments).await?;

        // Media is left in place on failure so a rerun can resume
        if self.config.analysis.cleanup_after_report {
            remove_dirs(&self.paths.transient_dirs()).await?;
        }

        Ok(StageOutcome::Analyzed(report))
    }

    /// Rewrite the discovered-videos table to the rows whose video file exists
    pub fn prune_to_downloaded(&self) -> Result<StageOutcome, PipelineError> {
        let videos = self.discovered(Stage::Prune)?;
        let before = videos.len();
        let kept = retain_downloaded(videos, &self.paths);

        write_table(&self.paths.discovered_videos, &kept)?;
        Ok(StageOutcome::Pruned {
            kept: kept.len(),
            removed: before - kept.len(),
        })
    }
}

fn log_outcome(stage: Stage, outcome: &StageOutcome) {
    let batch = match outcome {
        StageOutcome::Crawled { videos } => {
            info!("✅ {}: {} videos discovered", stage, videos);
            return;
        }
        StageOutcome::Analyzed(report) => {
            info!("✅ {}: report written to {}", stage, report.path.display());
            return;
        }
        StageOutcome::Pruned { kept, removed } => {
            info!("✅ {}: kept {} videos, removed {}", stage, kept, removed);
            return;
        }
        StageOutcome::Comments { rows, outcome } => {
            info!("✅ {}: {} comment rows", stage, rows);
            outcome
        }
        StageOutcome::Downloaded { outcome, .. } | StageOutcome::Audio { outcome, .. } => outcome,
    };

    info!(
        "✅ {}: {} of {} done, {} already present, {} skipped",
        stage,
        batch.completed,
        batch.total,
        batch.skipped_existing,
        batch.failed.len()
    );
    for failure in &batch.failed {
        let err = PipelineError::per_item(&failure.video_id, failure.reason.as_str());
        warn!(video_id = %failure.video_id, "{} skipped {}", stage, err);
    }
}
