//! HTTP client for the `YouTube` Data API v3.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{
    CommentThreadListResponse, ErrorEnvelope, SearchListResponse, VideoListResponse, VideoResource,
};
use super::YouTubeError;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum page size for `search` and ids per `videos` call
pub const MAX_PAGE_SIZE: usize = 50;

/// Maximum page size for `commentThreads`
pub const MAX_COMMENT_PAGE_SIZE: usize = 100;

/// Parameters for one `search.list` call
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub order: &'static str,
    pub published_after: Option<DateTime<Utc>>,
    pub region_code: Option<String>,
    /// `short` restricts to uploads under four minutes
    pub video_duration: Option<&'static str>,
}

/// Client for the `YouTube` Data API.
///
/// Use [`YouTubeClient::new`] for production or [`YouTubeClient::with_base_url`]
/// to point at a mock server in tests.
pub struct YouTubeClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl YouTubeClient {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, YouTubeError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, YouTubeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("brand-sentiment/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Trailing slash so `join` appends the endpoint instead of replacing
        // the last path segment
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalised).map_err(|_| YouTubeError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    /// Fetch one page of video search results.
    pub async fn search_page(
        &self,
        request: &SearchRequest,
        page_token: Option<&str>,
    ) -> Result<SearchListResponse, YouTubeError> {
        let max_results = MAX_PAGE_SIZE.to_string();
        let published_after = request
            .published_after
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));

        let mut params: Vec<(&str, &str)> = vec![
            ("part", "id"),
            ("type", "video"),
            ("q", &request.query),
            ("order", request.order),
            ("maxResults", &max_results),
        ];
        if let Some(after) = published_after.as_deref() {
            params.push(("publishedAfter", after));
        }
        if let Some(region) = request.region_code.as_deref() {
            params.push(("regionCode", region));
        }
        if let Some(duration) = request.video_duration {
            params.push(("videoDuration", duration));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        self.get_json("search", &params, &format!("search(q={})", request.query))
            .await
    }

    /// Hydrate video ids with snippet, statistics and content details.
    ///
    /// Ids are sent in chunks of [`MAX_PAGE_SIZE`]. Ids the API does not return
    /// (private or removed videos) are simply absent from the result.
    pub async fn videos(&self, ids: &[String]) -> Result<Vec<VideoResource>, YouTubeError> {
        let mut resources = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_PAGE_SIZE) {
            let joined = chunk.join(",");
            let params = [
                ("part", "snippet,statistics,contentDetails"),
                ("id", joined.as_str()),
                ("maxResults", "50"),
            ];
            let page: VideoListResponse = self
                .get_json("videos", &params, &format!("videos({} ids)", chunk.len()))
                .await?;
            resources.extend(page.items);
        }

        Ok(resources)
    }

    /// Fetch one page of comment threads for a video.
    pub async fn comment_threads_page(
        &self,
        video_id: &str,
        include_replies: bool,
        page_token: Option<&str>,
    ) -> Result<CommentThreadListResponse, YouTubeError> {
        let max_results = MAX_COMMENT_PAGE_SIZE.to_string();
        let part = if include_replies {
            "snippet,replies"
        } else {
            "snippet"
        };

        let mut params: Vec<(&str, &str)> = vec![
            ("part", part),
            ("videoId", video_id),
            ("textFormat", "plainText"),
            ("maxResults", &max_results),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        self.get_json(
            "commentThreads",
            &params,
            &format!("commentThreads(videoId={})", video_id),
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> Result<T, YouTubeError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|_| YouTubeError::InvalidBaseUrl(self.base_url.to_string()))?;

        debug!("GET {} {}", url, context);

        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| YouTubeError::Deserialize {
            context: context.to_string(),
            source: e,
        })
    }

    fn api_error(status: u16, body: &str) -> YouTubeError {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => YouTubeError::Api {
                status,
                reason: envelope
                    .error
                    .errors
                    .into_iter()
                    .find_map(|detail| detail.reason),
                message: envelope.error.message,
            },
            Err(_) => YouTubeError::Api {
                status,
                reason: None,
                message: body.chars().take(200).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_url() {
        let result = YouTubeClient::with_base_url("k", 5, "not a url");
        assert!(matches!(result, Err(YouTubeError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_api_error_extracts_reason() {
        let body = r#"{"error":{"code":403,"message":"The video has disabled comments.","errors":[{"reason":"commentsDisabled","domain":"youtube.commentThread"}]}}"#;
        let err = YouTubeClient::api_error(403, body);
        assert!(err.is_comments_disabled());
        assert!(err.to_string().contains("disabled comments"));
    }

    #[test]
    fn test_api_error_without_envelope() {
        let err = YouTubeClient::api_error(502, "Bad Gateway");
        assert_eq!(err.reason(), None);
        assert!(err.to_string().contains("502"));
    }
}
