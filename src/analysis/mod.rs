//! Two-phase AI analysis: batch summaries, then one strategic synthesis.

pub mod batches;
pub mod prompt;
pub mod report;

use chrono::Utc;
use tracing::info;

use crate::config::{AnalysisConfig, ReportFormat};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, LLM};
use crate::models::{DiscoveredVideo, RawComment, Report};
use crate::paths::BrandPaths;

use batches::{plan_batches, BatchSummarizer};
use prompt::{fill, load_template, thousands, DEFAULT_BATCH_PROMPT, DEFAULT_SYNTHESIS_PROMPT};
use report::{render, write_atomic, DEFAULT_REPORT_TEMPLATE};

/// Aggregate counts quoted in the synthesis prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetTotals {
    pub videos: u64,
    pub views: u64,
    pub likes: u64,
    pub comments_stats: u64,
    pub engagement: u64,
    pub comments_extracted: u64,
}

impl DatasetTotals {
    pub fn compute(videos: &[DiscoveredVideo], comments: &[RawComment]) -> Self {
        videos.iter().fold(
            Self {
                videos: videos.len() as u64,
                comments_extracted: comments.len() as u64,
                ..Self::default()
            },
            |acc, v| Self {
                views: acc.views.saturating_add(v.views),
                likes: acc.likes.saturating_add(v.likes),
                comments_stats: acc.comments_stats.saturating_add(v.comments),
                engagement: acc.engagement.saturating_add(v.engagement),
                ..acc
            },
        )
    }
}

/// Produces the strategic report from the discovered-videos and comments tables
pub struct ReportGenerator<'a> {
    config: &'a AnalysisConfig,
    paths: &'a BrandPaths,
    batch_llm: &'a dyn LLM,
    synthesis_llm: &'a dyn LLM,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        paths: &'a BrandPaths,
        batch_llm: &'a dyn LLM,
        synthesis_llm: &'a dyn LLM,
    ) -> Self {
        Self {
            config,
            paths,
            batch_llm,
            synthesis_llm,
        }
    }

    /// Run both phases and write the report file.
    ///
    /// Any model failure aborts before the report is written.
    pub async fn generate(
        &self,
        videos: &[DiscoveredVideo],
        comments: &[RawComment],
    ) -> Result<Report, PipelineError> {
        let brand = self.paths.brand.as_str();
        let batch_template = load_template(
            &self.config.batch_prompt_path,
            DEFAULT_BATCH_PROMPT,
            "Batch prompt",
        )?;

        let batches = plan_batches(videos, comments, self.config.batch_size);
        info!(
            "📊 Phase 1: {} videos in {} batches",
            videos.len(),
            batches.len()
        );

        let summarizer = BatchSummarizer {
            brand,
            template: &batch_template,
            paths: self.paths,
            max_comments: self.config.max_comments_per_batch,
            max_transcript_chars: self.config.max_transcript_chars,
            attach_media: self.config.attach_media,
        };

        let mut summaries = Vec::with_capacity(batches.len());
        for batch in &batches {
            summaries.push(summarizer.summarize(batch, self.batch_llm).await?);
        }

        info!(
            "🧠 Phase 2: synthesising report with {:?} {}",
            self.synthesis_llm.provider_type(),
            self.synthesis_llm.model()
        );
        let totals = DatasetTotals::compute(videos, comments);
        let analysis = self.synthesize(&summaries, &totals).await?;

        let template = match self.config.report_format {
            ReportFormat::Html => load_template(
                &self.config.report_template_path,
                DEFAULT_REPORT_TEMPLATE,
                "Report template",
            )?,
            ReportFormat::Md => String::new(),
        };

        let generated_at = Utc::now();
        let body = render(
            self.config.report_format,
            brand,
            &analysis,
            videos,
            &template,
            generated_at,
        );
        write_atomic(&self.paths.report, &body)?;

        info!("📄 Strategic report saved to: {}", self.paths.report.display());
        Ok(Report {
            brand: brand.to_string(),
            generated_at,
            path: self.paths.report.clone(),
            body,
        })
    }

    async fn synthesize(&self, summaries: &[String], totals: &DatasetTotals) -> Result<String, PipelineError> {
        let template = load_template(
            &self.config.synthesis_prompt_path,
            DEFAULT_SYNTHESIS_PROMPT,
            "Synthesis prompt",
        )?;

        let brand = self.paths.brand.as_str();
        let joined = summaries.join("\n\n---\n\n");
        let prompt = fill(
            &template,
            &[
                ("BRAND_NAME", brand),
                ("TOPIC_NAME", brand),
                ("BATCH_SUMMARIES", &joined),
                ("TOTAL_VIDEOS", &totals.videos.to_string()),
                ("TOTAL_VIEWS", &thousands(totals.views)),
                ("TOTAL_LIKES", &thousands(totals.likes)),
                ("TOTAL_COMMENTS_STATS", &thousands(totals.comments_stats)),
                ("TOTAL_ENGAGEMENT", &thousands(totals.engagement)),
                ("TOTAL_COMMENTS_EXTRACTED", &thousands(totals.comments_extracted)),
            ],
        );

        let response = self
            .synthesis_llm
            .chat(vec![ChatMessage::user(prompt)])
            .await
            .map_err(|e| PipelineError::UpstreamApi {
                service: "generative AI",
                message: format!("report synthesis failed: {:#}", e),
            })?;

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::{LLMProvider, LLMResponse};
    use crate::models::VideoKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed reply, or fails on demand
    struct ScriptedLLM {
        reply: &'static str,
        fail: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLLM {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                fail: false,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLM for ScriptedLLM {
        async fn chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<LLMResponse> {
            self.prompts
                .lock()
                .unwrap()
                .extend(messages.into_iter().map(|m| m.content));
            if self.fail {
                anyhow::bail!("quota exceeded");
            }
            Ok(LLMResponse {
                content: self.reply.to_string(),
                tokens_used: None,
            })
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::Gemini
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn video(id: &str, views: u64) -> DiscoveredVideo {
        DiscoveredVideo {
            video_id: id.to_string(),
            title: format!("Title {}", id),
            url: DiscoveredVideo::watch_url(id),
            channel: "Channel".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            views,
            likes: 10,
            comments: 5,
            engagement: 15,
            duration_seconds: 200,
            video_type: VideoKind::Video,
            description: String::new(),
        }
    }

    fn comment(id: &str, video_id: &str) -> RawComment {
        RawComment {
            comment_id: id.to_string(),
            video_id: video_id.to_string(),
            video_title: format!("Title {}", video_id),
            author: "@a".to_string(),
            text: "nice".to_string(),
            like_count: 1,
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            parent_id: None,
        }
    }

    fn setup(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.crawler.search_terms = "AcmeCo".to_string();
        config.output.base_dir = dir.path().join("outputs");
        config.analysis.batch_size = 2;
        config.analysis.batch_prompt_path = dir.path().join("missing_batch.txt");
        config.analysis.synthesis_prompt_path = dir.path().join("missing_synthesis.txt");
        config.analysis.report_template_path = dir.path().join("missing_template.html");
        config
    }

    #[test]
    fn test_dataset_totals() {
        let totals = DatasetTotals::compute(
            &[video("a", 1000), video("b", 2500)],
            &[comment("1", "a")],
        );
        assert_eq!(totals.videos, 2);
        assert_eq!(totals.views, 3500);
        assert_eq!(totals.engagement, 30);
        assert_eq!(totals.comments_extracted, 1);
    }

    #[tokio::test]
    async fn test_generate_writes_report_and_reuses_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = setup(&dir);
        let paths = BrandPaths::from_config(&config);
        let videos = vec![video("a", 10), video("b", 20), video("c", 30)];
        let comments = vec![comment("1", "a"), comment("2", "c")];

        let batch_llm = ScriptedLLM::new("batch summary");
        let synthesis_llm = ScriptedLLM::new("## Executive Summary\nMostly positive.");
        let generator = ReportGenerator::new(&config.analysis, &paths, &batch_llm, &synthesis_llm);

        let report = generator.generate(&videos, &comments).await.unwrap();
        assert_eq!(batch_llm.calls(), 2);
        assert_eq!(synthesis_llm.calls(), 1);
        assert!(report.path.is_file());
        assert!(report.body.contains("<h2>Executive Summary</h2>"));

        let synthesis_prompt = synthesis_llm.prompts.lock().unwrap()[0].clone();
        assert!(synthesis_prompt.contains("batch summary\n\n---\n\nbatch summary"));
        assert!(synthesis_prompt.contains("3 videos"));

        // Second run hits the cache for both batches
        generator.generate(&videos, &comments).await.unwrap();
        assert_eq!(batch_llm.calls(), 2);
        assert_eq!(synthesis_llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_synthesis_failure_writes_no_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = setup(&dir);
        let paths = BrandPaths::from_config(&config);
        let videos = vec![video("a", 10)];
        let comments = vec![comment("1", "a")];

        let batch_llm = ScriptedLLM::new("batch summary");
        let mut synthesis_llm = ScriptedLLM::new("unused");
        synthesis_llm.fail = true;
        let generator = ReportGenerator::new(&config.analysis, &paths, &batch_llm, &synthesis_llm);

        let err = generator.generate(&videos, &comments).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!paths.report.exists());
    }
}
