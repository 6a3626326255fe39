//! Phase one of the analysis: per-batch summaries with an on-disk cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::prompt::{fill, thousands};
use super::report::write_atomic;
use crate::error::PipelineError;
use crate::llm::{ChatMessage, MediaAttachment, LLM};
use crate::models::{DiscoveredVideo, RawComment, VideoKind};
use crate::paths::BrandPaths;

/// A slice of the discovered videos plus their comments
#[derive(Debug)]
pub struct VideoBatch<'a> {
    /// 1-based batch number
    pub number: usize,
    pub videos: &'a [DiscoveredVideo],
    pub comments: Vec<&'a RawComment>,
}

/// Split videos into batches of `batch_size`, attaching each batch's comments
pub fn plan_batches<'a>(
    videos: &'a [DiscoveredVideo],
    comments: &'a [RawComment],
    batch_size: usize,
) -> Vec<VideoBatch<'a>> {
    videos
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(i, chunk)| {
            let ids: HashSet<&str> = chunk.iter().map(|v| v.video_id.as_str()).collect();
            VideoBatch {
                number: i + 1,
                videos: chunk,
                comments: comments
                    .iter()
                    .filter(|c| ids.contains(c.video_id.as_str()))
                    .collect(),
            }
        })
        .collect()
}

/// Most-liked comments first, ties in table order
pub fn sample_comments<'a>(comments: &[&'a RawComment], max: usize) -> Vec<&'a RawComment> {
    let mut sampled = comments.to_vec();
    sampled.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    sampled.truncate(max);
    sampled
}

/// Markdown table of the batch's videos and their public counts
pub fn video_metadata(videos: &[DiscoveredVideo]) -> String {
    let mut table = String::from(
        "| Title | Channel | Type | Views | Likes | Comments |\n|---|---|---|---:|---:|---:|\n",
    );
    for v in videos {
        let kind = match v.video_type {
            VideoKind::Short => "short",
            VideoKind::Video => "video",
        };
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            escape_cell(&v.title),
            escape_cell(&v.channel),
            kind,
            thousands(v.views),
            thousands(v.likes),
            thousands(v.comments),
        ));
    }
    table
}

pub(crate) fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn comments_data(comments: &[&RawComment]) -> String {
    if comments.is_empty() {
        return "(no comments)".to_string();
    }

    comments
        .iter()
        .map(|c| {
            format!(
                "- [{}] ({} likes) {}",
                c.video_title,
                c.like_count,
                c.text.replace(['\n', '\r'], " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript excerpts for videos that have one, capped at `max_chars` each
fn transcripts(videos: &[DiscoveredVideo], paths: &BrandPaths, max_chars: usize) -> Result<String, PipelineError> {
    let mut sections = Vec::new();

    for video in videos {
        let path = paths.transcript_file(&video.video_id);
        if !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        let excerpt: String = text.trim().chars().take(max_chars).collect();
        if !excerpt.is_empty() {
            sections.push(format!("### {}\n{}", video.title, excerpt));
        }
    }

    Ok(if sections.is_empty() {
        "(no transcripts available)".to_string()
    } else {
        sections.join("\n\n")
    })
}

/// One media file per video: the downloaded video, else its audio track
pub fn batch_media(videos: &[DiscoveredVideo], paths: &BrandPaths) -> Vec<MediaAttachment> {
    videos
        .iter()
        .filter_map(|v| {
            [paths.video_file(&v.video_id), paths.audio_file(&v.video_id)]
                .into_iter()
                .find(|p| p.is_file())
        })
        .filter_map(|p| MediaAttachment::from_path(&p))
        .collect()
}

fn media_files(media: &[MediaAttachment]) -> String {
    let files: Vec<String> = media
        .iter()
        .filter_map(|m| m.path.file_name().map(|n| format!("- {}", n.to_string_lossy())))
        .collect();

    if files.is_empty() {
        "(no media files available)".to_string()
    } else {
        files.join("\n")
    }
}

/// Hex md5 of the prompt, so any change in inputs invalidates the cache entry
pub fn fingerprint(prompt: &str) -> String {
    format!("{:x}", md5::compute(prompt.as_bytes()))
}

pub fn cache_path(cache_dir: &Path, batch_number: usize, fingerprint: &str) -> PathBuf {
    cache_dir.join(format!("batch_{}_{}.md", batch_number, fingerprint))
}

/// Builds and runs the batch prompts
pub struct BatchSummarizer<'a> {
    pub brand: &'a str,
    pub template: &'a str,
    pub paths: &'a BrandPaths,
    pub max_comments: usize,
    pub max_transcript_chars: usize,
    /// Send the batch's media files along with the prompt
    pub attach_media: bool,
}

impl BatchSummarizer<'_> {
    pub fn build_prompt(&self, batch: &VideoBatch<'_>) -> Result<String, PipelineError> {
        let sampled = sample_comments(&batch.comments, self.max_comments);
        let metadata = video_metadata(batch.videos);
        let comments = comments_data(&sampled);
        let transcripts = transcripts(batch.videos, self.paths, self.max_transcript_chars)?;
        let media = media_files(&batch_media(batch.videos, self.paths));

        Ok(fill(
            self.template,
            &[
                ("BRAND_NAME", self.brand),
                ("TOPIC_NAME", self.brand),
                ("VIDEO_METADATA", &metadata),
                ("COMMENTS_DATA", &comments),
                ("TRANSCRIPTS", &transcripts),
                ("MEDIA_FILES_LIST", &media),
                ("AUDIO_FILES_LIST", &media),
            ],
        ))
    }

    /// Summarise one batch, reusing a cached summary for identical input
    pub async fn summarize(&self, batch: &VideoBatch<'_>, llm: &dyn LLM) -> Result<String, PipelineError> {
        let prompt = self.build_prompt(batch)?;
        let cached = cache_path(&self.paths.cache_dir, batch.number, &fingerprint(&prompt));

        if cached.is_file() {
            info!("📦 Batch {}: using cached summary", batch.number);
            return std::fs::read_to_string(&cached).map_err(|e| PipelineError::io(&cached, e));
        }

        info!(
            "🤖 Batch {}: summarising {} videos / {} comments with {}",
            batch.number,
            batch.videos.len(),
            batch.comments.len(),
            llm.model()
        );

        let media = batch_media(batch.videos, self.paths);
        let messages = vec![ChatMessage::user(prompt)];
        let response = if !self.attach_media || media.is_empty() {
            llm.chat(messages).await
        } else if llm.supports_media() {
            info!("📎 Batch {}: attaching {} media files", batch.number, media.len());
            llm.chat_with_media(messages, &media).await
        } else {
            warn!(
                "⚠️  Batch {}: {:?} model {} is text-only; {} media files are listed by name but not sent",
                batch.number,
                llm.provider_type(),
                llm.model(),
                media.len()
            );
            llm.chat(messages).await
        };
        let response = response.map_err(|e| PipelineError::UpstreamApi {
            service: "generative AI",
            message: format!("batch {} summary failed: {:#}", batch.number, e),
        })?;

        if let Some(tokens) = response.tokens_used {
            debug!("Batch {} used {} tokens", batch.number, tokens);
        }

        // Cache entries are complete or absent
        write_atomic(&cached, &response.content)?;

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMProvider, LLMResponse};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    /// Records the attachments of every call
    struct RecordingLLM {
        media: bool,
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    impl RecordingLLM {
        fn new(media: bool) -> Self {
            Self {
                media,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLM for RecordingLLM {
        async fn chat(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<LLMResponse> {
            self.calls.lock().unwrap().push(Vec::new());
            Ok(LLMResponse {
                content: "summary".to_string(),
                tokens_used: None,
            })
        }

        fn supports_media(&self) -> bool {
            self.media
        }

        async fn chat_with_media(
            &self,
            _messages: Vec<ChatMessage>,
            media: &[MediaAttachment],
        ) -> anyhow::Result<LLMResponse> {
            self.calls
                .lock()
                .unwrap()
                .push(media.iter().map(|m| m.path.clone()).collect());
            Ok(LLMResponse {
                content: "summary with media".to_string(),
                tokens_used: None,
            })
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::Gemini
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    fn brand_paths(dir: &tempfile::TempDir) -> BrandPaths {
        let mut config = crate::config::Config::default();
        config.crawler.search_terms = "AcmeCo".to_string();
        config.output.base_dir = dir.path().to_path_buf();
        BrandPaths::from_config(&config)
    }

    /// "a" has video and audio, "b" only audio, "c" nothing
    fn write_media(paths: &BrandPaths) {
        std::fs::create_dir_all(&paths.video_dir).unwrap();
        std::fs::create_dir_all(&paths.audio_dir).unwrap();
        std::fs::write(paths.video_file("a"), b"mp4").unwrap();
        std::fs::write(paths.audio_file("a"), b"mp3").unwrap();
        std::fs::write(paths.audio_file("b"), b"mp3").unwrap();
    }

    fn summarizer<'a>(paths: &'a BrandPaths, attach_media: bool) -> BatchSummarizer<'a> {
        BatchSummarizer {
            brand: "AcmeCo",
            template: "{{BRAND_NAME}}\n{{MEDIA_FILES_LIST}}",
            paths,
            max_comments: 10,
            max_transcript_chars: 100,
            attach_media,
        }
    }

    fn video(id: &str) -> DiscoveredVideo {
        DiscoveredVideo {
            video_id: id.to_string(),
            title: format!("Review {}", id),
            url: DiscoveredVideo::watch_url(id),
            channel: "Chan | Nel".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            views: 12345,
            likes: 100,
            comments: 2,
            engagement: 102,
            duration_seconds: 300,
            video_type: VideoKind::Video,
            description: String::new(),
        }
    }

    fn comment(id: &str, video_id: &str, likes: u64) -> RawComment {
        RawComment {
            comment_id: id.to_string(),
            video_id: video_id.to_string(),
            video_title: format!("Review {}", video_id),
            author: "@a".to_string(),
            text: format!("comment {}\nsecond line", id),
            like_count: likes,
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            parent_id: None,
        }
    }

    #[test]
    fn test_plan_batches_groups_comments_by_video() {
        let videos: Vec<_> = ["a", "b", "c"].iter().map(|id| video(id)).collect();
        let comments = vec![comment("1", "a", 0), comment("2", "c", 0), comment("3", "a", 0)];

        let batches = plan_batches(&videos, &comments, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].number, 1);
        assert_eq!(batches[0].videos.len(), 2);
        assert_eq!(batches[0].comments.len(), 2);
        assert_eq!(batches[1].comments[0].comment_id, "2");
    }

    #[test]
    fn test_sample_comments_prefers_liked() {
        let comments = vec![comment("1", "a", 1), comment("2", "a", 9), comment("3", "a", 9)];
        let refs: Vec<&RawComment> = comments.iter().collect();
        let ids: Vec<&str> = sample_comments(&refs, 2)
            .iter()
            .map(|c| c.comment_id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_video_metadata_escapes_cells() {
        let table = video_metadata(&[video("a")]);
        assert!(table.contains("Chan \\| Nel"));
        assert!(table.contains("12,345"));
    }

    #[test]
    fn test_fingerprint_changes_with_prompt() {
        assert_eq!(fingerprint("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(
            cache_path(Path::new("cache"), 3, "ff"),
            PathBuf::from("cache/batch_3_ff.md")
        );
    }

    #[test]
    fn test_build_prompt_fills_placeholders() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = crate::config::Config::default();
        config.crawler.search_terms = "AcmeCo".to_string();
        config.output.base_dir = dir.path().to_path_buf();
        let paths = BrandPaths::from_config(&config);

        std::fs::create_dir_all(&paths.transcripts_dir).unwrap();
        std::fs::write(paths.transcript_file("a"), "hello world transcript").unwrap();

        let videos = vec![video("a")];
        let comments = vec![comment("1", "a", 5)];
        let batches = plan_batches(&videos, &comments, 10);

        let summarizer = BatchSummarizer {
            brand: "AcmeCo",
            template: "{{BRAND_NAME}}|{{COMMENTS_DATA}}|{{TRANSCRIPTS}}|{{AUDIO_FILES_LIST}}",
            paths: &paths,
            max_comments: 10,
            max_transcript_chars: 5,
            attach_media: true,
        };
        let prompt = summarizer.build_prompt(&batches[0]).unwrap();

        assert!(prompt.starts_with("AcmeCo|"));
        assert!(prompt.contains("(5 likes) comment 1 second line"));
        assert!(prompt.contains("### Review a\nhello|"));
        assert!(prompt.ends_with("(no media files available)"));
    }

    #[test]
    fn test_batch_media_prefers_video_then_audio() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = brand_paths(&dir);
        write_media(&paths);

        let videos: Vec<_> = ["a", "b", "c"].iter().map(|id| video(id)).collect();
        let media = batch_media(&videos, &paths);

        assert_eq!(media.len(), 2);
        assert_eq!(media[0].path, paths.video_file("a"));
        assert_eq!(media[0].mime_type, "video/mp4");
        assert_eq!(media[1].path, paths.audio_file("b"));
        assert_eq!(media[1].mime_type, "audio/mpeg");
        assert_eq!(media_files(&media), "- a.mp4\n- b.mp3");
    }

    #[tokio::test]
    async fn test_summarize_attaches_media_and_caches_whole_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = brand_paths(&dir);
        write_media(&paths);

        let videos: Vec<_> = ["a", "b"].iter().map(|id| video(id)).collect();
        let batches = plan_batches(&videos, &[], 10);
        let llm = RecordingLLM::new(true);

        let summary = summarizer(&paths, true).summarize(&batches[0], &llm).await.unwrap();
        assert_eq!(summary, "summary with media");
        assert_eq!(
            *llm.calls.lock().unwrap(),
            vec![vec![paths.video_file("a"), paths.audio_file("b")]]
        );

        let entries: Vec<String> = std::fs::read_dir(&paths.cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("batch_1_") && entries[0].ends_with(".md"));

        // Second call is served from the cache without touching the model
        summarizer(&paths, true).summarize(&batches[0], &llm).await.unwrap();
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_text_only_model_still_summarises_batches_with_media() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = brand_paths(&dir);
        write_media(&paths);

        let videos = vec![video("a")];
        let batches = plan_batches(&videos, &[], 10);

        let text_only = RecordingLLM::new(false);
        let summary = summarizer(&paths, true).summarize(&batches[0], &text_only).await.unwrap();
        assert_eq!(summary, "summary");
        assert_eq!(*text_only.calls.lock().unwrap(), vec![Vec::<PathBuf>::new()]);

        // Attachments switched off: a media-capable model gets plain chat
        std::fs::remove_dir_all(&paths.cache_dir).unwrap();
        let capable = RecordingLLM::new(true);
        summarizer(&paths, false).summarize(&batches[0], &capable).await.unwrap();
        assert_eq!(*capable.calls.lock().unwrap(), vec![Vec::<PathBuf>::new()]);
    }
}
