pub mod providers;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// LLM provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LLMProvider {
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, LM Studio, ...)
    OpenAI,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    /// Base URL override; the provider default is used when unset
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Filled from the environment at start-up
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Delay between status checks while an uploaded file is processed
    pub file_poll_interval_ms: u64,
    pub file_poll_attempts: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 0.4,
            timeout_seconds: 300,
            file_poll_interval_ms: 2000,
            file_poll_attempts: 150,
        }
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Local media file sent alongside a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

impl MediaAttachment {
    /// Attachment for a media file we produce; `None` for other extensions
    pub fn from_path(path: &Path) -> Option<Self> {
        let mime_type = match path.extension()?.to_str()? {
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mp3" => "audio/mpeg",
            "m4a" => "audio/mp4",
            _ => return None,
        };
        Some(Self {
            path: path.to_path_buf(),
            mime_type,
        })
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse>;

    /// Whether `chat_with_media` hands files to the model
    fn supports_media(&self) -> bool {
        false
    }

    /// Chat with media files attached after the prompt
    async fn chat_with_media(
        &self,
        messages: Vec<ChatMessage>,
        media: &[MediaAttachment],
    ) -> Result<LLMResponse> {
        if !media.is_empty() {
            return Err(anyhow!(
                "{:?} provider cannot take media attachments",
                self.provider_type()
            ));
        }
        self.chat(messages).await
    }

    fn provider_type(&self) -> LLMProvider;
    fn model(&self) -> &str;
}

/// Create LLM instance based on configuration
pub fn create_llm(config: &LLMConfig) -> Result<Box<dyn LLM>> {
    match config.provider {
        LLMProvider::Gemini => Ok(Box::new(providers::GeminiProvider::new(config.clone())?)),
        LLMProvider::OpenAI => Ok(Box::new(providers::OpenAIProvider::new(config.clone())?)),
    }
}
