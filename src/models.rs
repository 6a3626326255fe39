use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which kinds of uploads a search should keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    Shorts,
    Videos,
    Both,
}

impl VideoType {
    /// Whether a classified video passes this filter
    pub fn accepts(self, kind: VideoKind) -> bool {
        match self {
            VideoType::Shorts => kind == VideoKind::Short,
            VideoType::Videos => kind == VideoKind::Video,
            VideoType::Both => true,
        }
    }
}

/// Classification of a single discovered upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    Short,
    Video,
}

/// Ordering applied to the discovered-videos table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[serde(rename = "relevance")]
    Relevance,
    #[serde(rename = "viewCount")]
    ViewCount,
    #[serde(rename = "engagement")]
    Engagement,
    #[serde(rename = "date")]
    Date,
}

impl SortBy {
    /// Value for the search endpoint's `order` parameter
    pub fn api_order(self) -> &'static str {
        match self {
            SortBy::Relevance | SortBy::Engagement => "relevance",
            SortBy::ViewCount => "viewCount",
            SortBy::Date => "date",
        }
    }
}

/// Search parameters for one run. Built once from the crawler config and only
/// ever handed out by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub term: String,
    pub modifiers: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub min_view_count: u64,
    pub video_type: VideoType,
    pub published_after: Option<NaiveDate>,
    pub sort_by: SortBy,
    pub max_results: usize,
    pub shorts_max_seconds: u64,
}

impl SearchQuery {
    /// Query string sent to the search endpoint: the quoted term OR-combined
    /// with the modifiers, e.g. `"AcmeCo" (review | unboxing)`.
    pub fn api_query(&self) -> String {
        let modifiers: Vec<&str> = self
            .modifiers
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .collect();

        if modifiers.is_empty() {
            format!("\"{}\"", self.term)
        } else {
            format!("\"{}\" ({})", self.term, modifiers.join(" | "))
        }
    }

    /// Inclusive lower bound on publish time, midnight UTC of `published_after`
    pub fn published_after_bound(&self) -> Option<DateTime<Utc>> {
        self.published_after
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }
}

/// One row of the discovered-videos table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredVideo {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub channel: String,
    pub published_at: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub engagement: u64,
    pub duration_seconds: u64,
    pub video_type: VideoKind,
    pub description: String,
}

impl DiscoveredVideo {
    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }
}

/// Engagement score: likes plus comments
pub fn engagement_score(likes: u64, comments: u64) -> u64 {
    likes.saturating_add(comments)
}

/// One row of the raw-comments table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub comment_id: String,
    pub video_id: String,
    pub video_title: String,
    pub author: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: DateTime<Utc>,
    /// Set for replies, empty for top-level comments
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }
}

/// A downloaded or derived media file for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub video_id: String,
    pub kind: MediaKind,
    pub path: PathBuf,
}

/// The final strategic report
#[derive(Debug, Clone)]
pub struct Report {
    pub brand: String,
    pub generated_at: DateTime<Utc>,
    pub path: PathBuf,
    pub body: String,
}

/// A video that was skipped during a batch stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub video_id: String,
    pub reason: String,
}

/// Per-stage counters for the batch stages (download, audio, comments)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub completed: usize,
    pub skipped_existing: usize,
    pub failed: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_failure(&mut self, video_id: &str, reason: impl Into<String>) {
        self.failed.push(ItemFailure {
            video_id: video_id.to_string(),
            reason: reason.into(),
        });
    }
}
