/// Brand Sentiment - YouTube brand-perception research pipeline
///
/// Discovers videos about a brand, collects their media and comments, and asks
/// a generative-AI model for a strategic report. Stages run sequentially and
/// hand data to each other through per-brand CSV tables.

pub mod analysis;
pub mod audio;
pub mod comments;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod llm;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod tables;
pub mod tools;
pub mod transcription;
pub mod youtube;

// Re-export main types for easy access
pub use crate::analysis::ReportGenerator;
pub use crate::audio::AudioExtractor;
pub use crate::comments::CommentExtractor;
pub use crate::config::{Config, Credentials};
pub use crate::crawler::VideoDiscovery;
pub use crate::downloader::MediaDownloader;
pub use crate::error::PipelineError;
pub use crate::llm::{LLMConfig, LLMProvider};
pub use crate::models::{DiscoveredVideo, MediaAsset, RawComment, Report, SearchQuery};
pub use crate::paths::BrandPaths;
pub use crate::pipeline::{Pipeline, Stage, StageOutcome};
pub use crate::transcription::WhisperTranscriber;
pub use crate::youtube::YouTubeClient;
