use tracing::{debug, info, warn};

use crate::config::CommentsConfig;
use crate::error::PipelineError;
use crate::models::{BatchOutcome, DiscoveredVideo, RawComment};
use crate::youtube::types::{Comment, CommentThread};
use crate::youtube::{YouTubeClient, YouTubeError};

/// Pulls comment threads for every discovered video
pub struct CommentExtractor<'a> {
    client: &'a YouTubeClient,
    max_per_video: usize,
    include_replies: bool,
}

impl<'a> CommentExtractor<'a> {
    pub fn new(client: &'a YouTubeClient, config: &CommentsConfig) -> Self {
        Self {
            client,
            max_per_video: config.max_comments_per_video,
            include_replies: config.include_replies,
        }
    }

    /// Extract comments for all videos in discovery order.
    ///
    /// Videos whose comments cannot be read are logged and recorded in the
    /// outcome; quota and auth failures abort the whole stage.
    pub async fn extract_all(
        &self,
        videos: &[DiscoveredVideo],
    ) -> Result<(Vec<RawComment>, BatchOutcome), PipelineError> {
        let mut outcome = BatchOutcome::new(videos.len());
        let mut rows = Vec::new();

        for (index, video) in videos.iter().enumerate() {
            info!(
                "💬 [{}/{}] Fetching comments for: {}",
                index + 1,
                videos.len(),
                video.title
            );

            match self.extract_video(video).await {
                Ok(comments) => {
                    debug!(video_id = %video.video_id, "Collected {} comments", comments.len());
                    rows.extend(comments);
                    outcome.completed += 1;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    let reason = if e.is_comments_disabled() {
                        "comments disabled".to_string()
                    } else {
                        e.to_string()
                    };
                    warn!(video_id = %video.video_id, "Skipping comments: {}", reason);
                    outcome.record_failure(&video.video_id, reason);
                }
            }
        }

        info!(
            "✅ Extracted {} comments from {}/{} videos",
            rows.len(),
            outcome.completed,
            outcome.total
        );
        Ok((rows, outcome))
    }

    /// Paginate one video's threads until exhausted or the cap is reached
    async fn extract_video(&self, video: &DiscoveredVideo) -> Result<Vec<RawComment>, YouTubeError> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        while rows.len() < self.max_per_video {
            let page = self
                .client
                .comment_threads_page(&video.video_id, self.include_replies, page_token.as_deref())
                .await?;

            for thread in page.items {
                rows.extend(flatten_thread(thread, video, self.include_replies));
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        rows.truncate(self.max_per_video);
        Ok(rows)
    }
}

/// Top-level comment first, then inline replies when requested.
///
/// Rows are keyed to the discovered video rather than the id echoed back by the
/// API, so every row references the discovered-videos table.
fn flatten_thread(thread: CommentThread, video: &DiscoveredVideo, include_replies: bool) -> Vec<RawComment> {
    let mut rows = vec![to_raw_comment(thread.snippet.top_level_comment, video, None)];

    if include_replies {
        if let Some(replies) = thread.replies {
            for reply in replies.comments {
                let parent = reply
                    .snippet
                    .parent_id
                    .clone()
                    .unwrap_or_else(|| thread.id.clone());
                rows.push(to_raw_comment(reply, video, Some(parent)));
            }
        }
    }

    rows
}

fn to_raw_comment(comment: Comment, video: &DiscoveredVideo, parent_id: Option<String>) -> RawComment {
    RawComment {
        comment_id: comment.id,
        video_id: video.video_id.clone(),
        video_title: video.title.clone(),
        author: comment.snippet.author_display_name,
        text: comment.snippet.text_display,
        like_count: comment.snippet.like_count,
        published_at: comment.snippet.published_at,
        parent_id,
    }
}
