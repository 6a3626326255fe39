use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{engagement_score, DiscoveredVideo, SearchQuery, SortBy, VideoKind, VideoType};
use crate::youtube::types::{parse_iso8601_duration, VideoResource};
use crate::youtube::{SearchRequest, YouTubeClient};

/// Finds brand-related videos through the search API
pub struct VideoDiscovery<'a> {
    client: &'a YouTubeClient,
    max_search_pages: u32,
    region_code: Option<String>,
}

impl<'a> VideoDiscovery<'a> {
    pub fn new(client: &'a YouTubeClient, max_search_pages: u32, region_code: Option<String>) -> Self {
        Self {
            client,
            max_search_pages,
            region_code,
        }
    }

    /// Search, hydrate, filter, sort and truncate.
    ///
    /// Any API error is returned as-is; discovery has no per-item failures.
    pub async fn discover(&self, query: &SearchQuery) -> Result<Vec<DiscoveredVideo>, PipelineError> {
        info!("🔍 Searching YouTube for: {}", query.api_query());

        let video_ids = self.search_ids(query).await?;
        if video_ids.is_empty() {
            warn!("No videos found matching the search criteria");
            return Ok(Vec::new());
        }

        info!("📹 Found {} unique videos, fetching details...", video_ids.len());
        let resources = self.client.videos(&video_ids).await?;

        // `videos.list` does not promise input order; restore search order for relevance
        let mut by_id: HashMap<String, VideoResource> =
            resources.into_iter().map(|r| (r.id.clone(), r)).collect();
        let ordered: Vec<VideoResource> = video_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let candidates: Vec<DiscoveredVideo> = ordered
            .into_iter()
            .filter_map(|resource| {
                let id = resource.id.clone();
                let video = to_discovered(resource, query.shorts_max_seconds);
                if video.is_none() {
                    debug!(video_id = %id, "Skipping video without snippet");
                }
                video
            })
            .collect();

        let fetched = candidates.len();
        let mut videos = filter_videos(candidates, query);
        info!("🧹 {} of {} videos passed filters", videos.len(), fetched);

        sort_videos(&mut videos, query.sort_by);
        videos.truncate(query.max_results);

        Ok(videos)
    }

    /// Collect unique video ids from up to `max_search_pages` pages
    async fn search_ids(&self, query: &SearchQuery) -> Result<Vec<String>, PipelineError> {
        let request = SearchRequest {
            query: query.api_query(),
            order: query.sort_by.api_order(),
            published_after: query.published_after_bound(),
            region_code: self.region_code.clone(),
            video_duration: match query.video_type {
                VideoType::Shorts => Some("short"),
                _ => None,
            },
        };

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 1..=self.max_search_pages {
            let response = self
                .client
                .search_page(&request, page_token.as_deref())
                .await?;

            for item in response.items {
                if let Some(id) = item.id.video_id {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
            }
            debug!("Search page {} → {} unique ids so far", page, ids.len());

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(ids)
    }
}

/// Classify an upload as a short or a regular video.
///
/// Shorts are uploads with a known duration at or under `shorts_max_seconds`,
/// or anything explicitly tagged `#shorts` in its title or description.
pub fn classify_video(duration_seconds: u64, title: &str, description: &str, shorts_max_seconds: u64) -> VideoKind {
    let tagged = title.to_lowercase().contains("#shorts")
        || description.to_lowercase().contains("#shorts");

    if tagged || (duration_seconds > 0 && duration_seconds <= shorts_max_seconds) {
        VideoKind::Short
    } else {
        VideoKind::Video
    }
}

/// Validate an API resource into a table row. Resources without a snippet are rejected.
fn to_discovered(resource: VideoResource, shorts_max_seconds: u64) -> Option<DiscoveredVideo> {
    let snippet = resource.snippet?;
    let stats = resource.statistics.unwrap_or_default();
    let duration_seconds = resource
        .content_details
        .and_then(|c| parse_iso8601_duration(&c.duration))
        .unwrap_or(0);

    let likes = stats.likes();
    let comments = stats.comments();

    Some(DiscoveredVideo {
        url: DiscoveredVideo::watch_url(&resource.id),
        video_type: classify_video(
            duration_seconds,
            &snippet.title,
            &snippet.description,
            shorts_max_seconds,
        ),
        video_id: resource.id,
        title: snippet.title,
        channel: snippet.channel_title,
        published_at: snippet.published_at,
        views: stats.views(),
        likes,
        comments,
        engagement: engagement_score(likes, comments),
        duration_seconds,
        description: snippet.description,
    })
}

/// Case-insensitive matcher for excluded keywords as whole words, so "ad"
/// drops "AD | unboxing" but keeps "Adidas" and "made"
pub fn exclusion_pattern(keywords: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }

    // Not `\b`: keywords such as "#ad" start with a non-word character
    let pattern = format!(r"(?i)(?:^|\W)(?:{})(?:$|\W)", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring exclude_keywords, pattern did not compile: {}", e);
            None
        }
    }
}

/// Apply keyword, view, type and publish-date filters
pub fn filter_videos(videos: Vec<DiscoveredVideo>, query: &SearchQuery) -> Vec<DiscoveredVideo> {
    let after = query.published_after_bound();
    let excluded = exclusion_pattern(&query.exclude_keywords);

    videos
        .into_iter()
        .filter(|v| excluded.as_ref().map_or(true, |re| !re.is_match(&v.title)))
        .filter(|v| v.views >= query.min_view_count)
        .filter(|v| query.video_type.accepts(v.video_type))
        .filter(|v| after.map_or(true, |bound| v.published_at >= bound))
        .collect()
}

/// Stable sort; relevance keeps the API's order
pub fn sort_videos(videos: &mut [DiscoveredVideo], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => {}
        SortBy::ViewCount => videos.sort_by(|a, b| b.views.cmp(&a.views)),
        SortBy::Engagement => videos.sort_by(|a, b| b.engagement.cmp(&a.engagement)),
        SortBy::Date => videos.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn video(id: &str, title: &str, views: u64, likes: u64, day: u32, kind: VideoKind) -> DiscoveredVideo {
        DiscoveredVideo {
            video_id: id.to_string(),
            title: title.to_string(),
            url: DiscoveredVideo::watch_url(id),
            channel: "Channel".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap(),
            views,
            likes,
            comments: 1,
            engagement: engagement_score(likes, 1),
            duration_seconds: 300,
            video_type: kind,
            description: String::new(),
        }
    }

    fn query() -> SearchQuery {
        SearchQuery {
            term: "AcmeCo".to_string(),
            modifiers: Vec::new(),
            exclude_keywords: vec!["sponsored".to_string()],
            min_view_count: 100,
            video_type: VideoType::Videos,
            published_after: NaiveDate::from_ymd_opt(2024, 1, 10),
            sort_by: SortBy::ViewCount,
            max_results: 2,
            shorts_max_seconds: 60,
        }
    }

    #[test]
    fn test_classify_video() {
        assert_eq!(classify_video(45, "Quick look", "", 60), VideoKind::Short);
        assert_eq!(classify_video(60, "Quick look", "", 60), VideoKind::Short);
        assert_eq!(classify_video(61, "Full review", "", 60), VideoKind::Video);
        assert_eq!(classify_video(0, "Live stream", "", 60), VideoKind::Video);
        assert_eq!(classify_video(170, "AcmeCo #Shorts", "", 60), VideoKind::Short);
        assert_eq!(classify_video(170, "Clip", "tags: #shorts", 60), VideoKind::Short);
    }

    #[test]
    fn test_filters_apply_all_criteria() {
        let videos = vec![
            video("keep", "AcmeCo review", 500, 10, 12, VideoKind::Video),
            video("sponsored", "AcmeCo SPONSORED review", 900, 10, 12, VideoKind::Video),
            video("low_views", "AcmeCo review", 50, 10, 12, VideoKind::Video),
            video("short", "AcmeCo review", 500, 10, 12, VideoKind::Short),
            video("old", "AcmeCo review", 500, 10, 9, VideoKind::Video),
            video("boundary", "AcmeCo review", 500, 10, 10, VideoKind::Video),
        ];

        let kept: Vec<String> = filter_videos(videos, &query())
            .into_iter()
            .map(|v| v.video_id)
            .collect();
        assert_eq!(kept, vec!["keep".to_string(), "boundary".to_string()]);
    }

    #[test]
    fn test_excluded_keywords_match_whole_words_only() {
        let mut q = query();
        q.term = "Adidas".to_string();
        q.exclude_keywords = vec!["sponsored".to_string(), "ad".to_string(), "#ad".to_string()];
        let videos = vec![
            video("brand", "Adidas Samba honest review", 500, 10, 12, VideoKind::Video),
            video("made", "AcmeCo: I made the switch", 500, 10, 12, VideoKind::Video),
            video("upgrade", "Is it worth the upgrade? Full breakdown", 500, 10, 12, VideoKind::Video),
            video("ad_prefix", "AD | Adidas haul", 500, 10, 12, VideoKind::Video),
            video("hashtag", "New kicks #ad", 500, 10, 12, VideoKind::Video),
            video("sponsored", "Sponsored: Adidas drop", 500, 10, 12, VideoKind::Video),
        ];

        let kept: Vec<String> = filter_videos(videos, &q)
            .into_iter()
            .map(|v| v.video_id)
            .collect();
        assert_eq!(kept, vec!["brand", "made", "upgrade"]);
    }

    #[test]
    fn test_exclusion_pattern_empty_keywords() {
        assert!(exclusion_pattern(&[]).is_none());
        assert!(exclusion_pattern(&[" ".to_string()]).is_none());
    }

    #[test]
    fn test_published_after_bound_is_inclusive() {
        let mut q = query();
        q.published_after = NaiveDate::from_ymd_opt(2024, 1, 12);
        let mut on_boundary = video("b", "AcmeCo", 500, 1, 12, VideoKind::Video);
        on_boundary.published_at = Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap();

        assert_eq!(filter_videos(vec![on_boundary], &q).len(), 1);
    }

    #[test]
    fn test_sort_by_view_count_is_non_increasing() {
        let mut videos = vec![
            video("a", "t", 10, 1, 1, VideoKind::Video),
            video("b", "t", 30, 1, 2, VideoKind::Video),
            video("c", "t", 20, 1, 3, VideoKind::Video),
        ];
        sort_videos(&mut videos, SortBy::ViewCount);
        assert!(videos.windows(2).all(|w| w[0].views >= w[1].views));
    }

    #[test]
    fn test_sort_by_date_is_newest_first() {
        let mut videos = vec![
            video("a", "t", 10, 1, 1, VideoKind::Video),
            video("b", "t", 30, 1, 3, VideoKind::Video),
            video("c", "t", 20, 1, 2, VideoKind::Video),
        ];
        sort_videos(&mut videos, SortBy::Date);
        let ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_by_engagement_and_relevance() {
        let mut videos = vec![
            video("a", "t", 10, 5, 1, VideoKind::Video),
            video("b", "t", 30, 50, 2, VideoKind::Video),
            video("c", "t", 20, 20, 3, VideoKind::Video),
        ];
        sort_videos(&mut videos, SortBy::Relevance);
        assert_eq!(videos[0].video_id, "a");

        sort_videos(&mut videos, SortBy::Engagement);
        let ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
