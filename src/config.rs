use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::llm::{LLMConfig, LLMProvider};
use crate::models::{SearchQuery, SortBy, VideoType};

/// Configuration for the brand-sentiment pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search parameters for video discovery
    pub crawler: CrawlerConfig,

    /// YouTube Data API client settings
    pub youtube: YouTubeConfig,

    /// Comment extraction settings
    pub comments: CommentsConfig,

    /// yt-dlp download settings
    pub downloader: DownloaderConfig,

    /// Audio extraction and transcription settings
    pub audio: AudioConfig,

    /// Batch analysis and report settings
    pub analysis: AnalysisConfig,

    /// Generative-AI provider settings
    pub llm: LLMConfig,

    /// Output and logging settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Brand or topic to search for. Also names the output directory.
    pub search_terms: String,

    /// Extra words OR-combined with the search term
    pub search_modifiers: Vec<String>,

    /// Titles containing any of these (case-insensitive) are dropped
    pub exclude_keywords: Vec<String>,

    /// Minimum view count for a video to be kept
    pub min_view_count: u64,

    pub video_type: VideoType,

    /// Inclusive lower bound on publish date (YYYY-MM-DD)
    pub published_after: Option<NaiveDate>,

    pub sort_by: SortBy,

    /// Cap on rows in the discovered-videos table
    pub max_results: usize,

    /// Number of 50-result search pages to read at most
    pub max_search_pages: u32,

    /// Region hint for the search endpoint
    pub region_code: Option<String>,

    /// Uploads at or under this duration count as shorts
    pub shorts_max_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Cap on comment rows (top-level plus replies) per video
    pub max_comments_per_video: usize,

    /// Flatten inline replies into the table
    pub include_replies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// yt-dlp executable
    pub yt_dlp_path: PathBuf,

    pub video_folder_name: String,

    /// Maximum video height requested from yt-dlp
    pub max_height: u32,

    /// Netscape cookies file passed to yt-dlp when it exists
    pub cookies_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ffmpeg executable used to derive audio from downloaded videos
    pub ffmpeg_path: PathBuf,

    pub audio_folder_name: String,

    /// MP3 VBR quality passed to ffmpeg (`-q:a`), 0 best .. 9 worst
    pub mp3_quality: u8,

    /// Transcribe extracted audio with the whisper CLI
    pub transcribe: bool,

    pub whisper_command: String,

    pub whisper_model: String,

    /// Language hint for whisper
    pub language: Option<String>,

    pub transcripts_folder_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Model used for per-batch summaries
    pub batch_model: String,

    /// Model used for the final synthesis
    pub synthesis_model: String,

    /// Videos per batch summary
    pub batch_size: usize,

    /// Comments sampled into each batch prompt
    pub max_comments_per_batch: usize,

    /// Characters of transcript kept per video
    pub max_transcript_chars: usize,

    pub batch_prompt_path: PathBuf,

    pub synthesis_prompt_path: PathBuf,

    pub report_template_path: PathBuf,

    pub report_format: ReportFormat,

    pub cache_folder_name: String,

    /// Remove media, transcripts and batch cache after a successful report
    pub cleanup_after_report: bool,

    /// Send each batch's video (or audio) files to the batch model
    pub attach_media: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Md,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Md => "md",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base output directory; each brand gets a subdirectory
    pub base_dir: PathBuf,

    /// Default tracing filter: a bare level (`info`) or a full directive
    /// (`brand_sentiment=info,reqwest=debug`)
    pub log_level: String,
}

impl OutputConfig {
    /// `EnvFilter` directive for `log_level`. A bare level applies to this
    /// crate, with dependencies held at `warn`.
    pub fn log_directive(&self) -> String {
        let level = self.log_level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else if level.is_empty() {
            "brand_sentiment=info,warn".to_string()
        } else {
            format!("brand_sentiment={},warn", level)
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            search_terms: String::new(),
            search_modifiers: vec!["review".to_string(), "opinion".to_string()],
            exclude_keywords: vec!["ad".to_string(), "sponsored".to_string()],
            min_view_count: 1000,
            video_type: VideoType::Both,
            published_after: None,
            sort_by: SortBy::Relevance,
            max_results: 50,
            max_search_pages: 3,
            region_code: None,
            shorts_max_seconds: 60,
        }
    }
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_comments_per_video: 100,
            include_replies: false,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::from("yt-dlp"),
            video_folder_name: "video".to_string(),
            max_height: 480,
            cookies_file: Some(PathBuf::from("cookies.txt")),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio_folder_name: "audio".to_string(),
            mp3_quality: 4,
            transcribe: false,
            whisper_command: "whisper".to_string(),
            whisper_model: "base".to_string(),
            language: None,
            transcripts_folder_name: "transcripts".to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_model: "gemini-2.5-flash".to_string(),
            synthesis_model: "gemini-2.5-pro".to_string(),
            batch_size: 10,
            max_comments_per_batch: 300,
            max_transcript_chars: 4000,
            batch_prompt_path: PathBuf::from("prompts/batch_summary.txt"),
            synthesis_prompt_path: PathBuf::from("prompts/strategic_synthesis.txt"),
            report_template_path: PathBuf::from("templates/strategic_report_template.html"),
            report_format: ReportFormat::Html,
            cache_folder_name: "cache".to_string(),
            cleanup_after_report: true,
            attach_media: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./outputs"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self, PipelineError> {
        let config_paths = ["brand-sentiment.toml", "config/brand-sentiment.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::load_from(Path::new(path));
            }
        }

        Err(PipelineError::Configuration(format!(
            "no configuration file found (looked for {})",
            config_paths.join(", ")
        )))
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, PipelineError> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml(&config_str).map_err(|e| {
            PipelineError::Configuration(format!("{}: {}", path.display(), e))
        })?;

        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(config_str)
    }

    /// Apply `BRAND_SENTIMENT_*` overrides from the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(output_dir) = lookup("BRAND_SENTIMENT_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }

        if let Some(log_level) = lookup("BRAND_SENTIMENT_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        std::fs::write(path, config_str).map_err(|e| PipelineError::io(path, e))?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::Configuration(msg.to_string()));

        if self.crawler.search_terms.trim().is_empty() {
            return invalid("crawler.search_terms must not be empty");
        }
        if self.crawler.max_results == 0 {
            return invalid("crawler.max_results must be greater than 0");
        }
        if self.crawler.max_search_pages == 0 {
            return invalid("crawler.max_search_pages must be greater than 0");
        }
        if self.analysis.batch_size == 0 {
            return invalid("analysis.batch_size must be greater than 0");
        }
        if self.audio.mp3_quality > 9 {
            return invalid("audio.mp3_quality must be between 0 and 9");
        }

        Ok(())
    }

    /// Build the immutable search query for this run
    pub fn search_query(&self) -> SearchQuery {
        let crawler = &self.crawler;
        SearchQuery {
            term: crawler.search_terms.trim().to_string(),
            modifiers: crawler.search_modifiers.clone(),
            exclude_keywords: crawler
                .exclude_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            min_view_count: crawler.min_view_count,
            video_type: crawler.video_type,
            published_after: crawler.published_after,
            sort_by: crawler.sort_by,
            max_results: crawler.max_results,
            shorts_max_seconds: crawler.shorts_max_seconds,
        }
    }

    /// LLM settings for one of the two analysis models
    pub fn llm_for_model(&self, model: &str, api_key: Option<String>) -> LLMConfig {
        LLMConfig {
            model: model.to_string(),
            api_key,
            ..self.llm.clone()
        }
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Brand Sentiment Configuration:\n\
            - Search terms: {}\n\
            - Video type: {:?}\n\
            - Sort by: {:?}\n\
            - Max results: {}\n\
            - Published after: {}\n\
            - LLM provider: {:?} (batch: {}, synthesis: {})\n\
            - Report format: {:?}\n\
            - Output directory: {}",
            self.crawler.search_terms,
            self.crawler.video_type,
            self.crawler.sort_by,
            self.crawler.max_results,
            self.crawler
                .published_after
                .map(|d| d.to_string())
                .unwrap_or_else(|| "any".to_string()),
            self.llm.provider,
            self.analysis.batch_model,
            self.analysis.synthesis_model,
            self.analysis.report_format,
            self.output.base_dir.display(),
        )
    }
}

/// Secrets read from the environment, never from the config file
#[derive(Clone, Default)]
pub struct Credentials {
    pub youtube_api_key: Option<String>,
    pub ai_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("youtube_api_key", &self.youtube_api_key.as_ref().map(|_| "***"))
            .field("ai_api_key", &self.ai_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";

impl Credentials {
    /// Load `.env` if present, then read the process environment
    pub fn from_env(llm: &LLMConfig) -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(llm, |key| std::env::var(key).ok())
    }

    /// Read secrets through the provided lookup, so tests need no `set_var`
    pub fn from_lookup<F>(llm: &LLMConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            youtube_api_key: non_empty(YOUTUBE_API_KEY_ENV),
            ai_api_key: non_empty(&llm.api_key_env),
        }
    }

    pub fn require_youtube(&self) -> Result<&str, PipelineError> {
        self.youtube_api_key.as_deref().ok_or_else(|| {
            PipelineError::Configuration(format!("{} must be set", YOUTUBE_API_KEY_ENV))
        })
    }

    pub fn require_ai(&self, llm: &LLMConfig) -> Result<&str, PipelineError> {
        match (&self.ai_api_key, &llm.provider) {
            (Some(key), _) => Ok(key),
            // Local OpenAI-compatible servers run without a key
            (None, LLMProvider::OpenAI) if llm.endpoint.is_some() => Ok(""),
            (None, _) => Err(PipelineError::Configuration(format!(
                "{} must be set",
                llm.api_key_env
            ))),
        }
    }
}
