//! Client for the `YouTube` Data API v3.
//!
//! Only the three endpoints the pipeline consumes are wrapped: `search`,
//! `videos` and `commentThreads`. Responses are deserialised into the raw
//! wire types in [`types`] and validated into pipeline records by the stages.

pub mod client;
pub mod types;

pub use client::{SearchRequest, YouTubeClient};

use thiserror::Error;

/// Errors returned by the `YouTube` Data API client.
#[derive(Debug, Error)]
pub enum YouTubeError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response carrying the API error envelope.
    #[error("YouTube API error {status} ({}): {message}", reason.as_deref().unwrap_or("unknown"))]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}

/// Error reasons that mean no further call in this run can succeed
const FATAL_REASONS: &[&str] = &[
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "keyInvalid",
    "keyExpired",
    "accessNotConfigured",
    "ipRefererBlocked",
    "forbidden",
];

impl YouTubeError {
    pub fn reason(&self) -> Option<&str> {
        match self {
            YouTubeError::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_comments_disabled(&self) -> bool {
        self.reason() == Some("commentsDisabled")
    }

    /// Quota, auth and transport failures abort the stage; everything else
    /// (comments disabled, video removed) only affects one video.
    pub fn is_fatal(&self) -> bool {
        match self {
            YouTubeError::Api { status, reason, .. } => {
                *status == 401
                    || reason
                        .as_deref()
                        .is_some_and(|r| FATAL_REASONS.contains(&r))
                    || (*status == 400 && reason.as_deref() == Some("badRequest"))
            }
            YouTubeError::Http(_) | YouTubeError::InvalidBaseUrl(_) => true,
            YouTubeError::Deserialize { .. } => true,
        }
    }
}

impl From<YouTubeError> for crate::error::PipelineError {
    fn from(err: YouTubeError) -> Self {
        crate::error::PipelineError::UpstreamApi {
            service: "YouTube Data",
            message: err.to_string(),
        }
    }
}
