use super::{ChatMessage, LLMConfig, LLMProvider, LLMResponse, MediaAttachment, LLM};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const FILE_STATE_ACTIVE: &str = "ACTIVE";
const FILE_STATE_FAILED: &str = "FAILED";

/// Gemini provider implementation
pub struct GeminiProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Either prompt text or a reference to an uploaded file
#[derive(Debug, Default, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "fileData", default, skip_serializing_if = "Option::is_none")]
    file_data: Option<GeminiFileData>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn file(file: &GeminiFile, fallback_mime: &str) -> Self {
        let mime_type = if file.mime_type.is_empty() {
            fallback_mime.to_string()
        } else {
            file.mime_type.clone()
        };
        Self {
            file_data: Some(GeminiFileData {
                mime_type,
                file_uri: file.uri.clone(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiUploadStart<'a> {
    file: GeminiUploadMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiUploadMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiFileEnvelope {
    file: GeminiFile,
}

/// File resource from the Files API (`files/<id>`)
#[derive(Debug, Clone, Deserialize)]
struct GeminiFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    state: String,
}

/// Pass a successful response through, otherwise turn the body into an error
async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(anyhow!("{} error {}: {}", what, status, text))
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Gemini API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config
            .endpoint
            .as_deref()
            .unwrap_or(GEMINI_BASE_URL)
            .trim_end_matches('/')
    }

    /// Media uploads live under `/upload/<version>` beside the REST root
    fn upload_base_url(&self) -> String {
        let base = self.base_url();
        match base.rsplit_once('/') {
            Some((root, version)) if version.starts_with('v') && !root.ends_with('/') => {
                format!("{}/upload/{}", root, version)
            }
            _ => format!("{}/upload", base),
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Gemini API key not configured"))
    }

    /// Resumable upload: a start request returns the session URL, then one
    /// request sends the bytes and finalizes.
    async fn upload_file(&self, api_key: &str, media: &MediaAttachment) -> Result<GeminiFile> {
        let bytes = tokio::fs::read(&media.path)
            .await
            .with_context(|| format!("reading {}", media.path.display()))?;
        let display_name = media
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = bytes.len();

        let start = self
            .client
            .post(format!("{}/files", self.upload_base_url()))
            .header("x-goog-api-key", api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", media.mime_type)
            .json(&GeminiUploadStart {
                file: GeminiUploadMetadata {
                    display_name: &display_name,
                },
            })
            .send()
            .await?;
        let start = ensure_success(start, "Gemini upload start").await?;

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("Gemini upload start returned no upload URL"))?
            .to_string();

        let response = self
            .client
            .post(&session_url)
            .header("x-goog-api-key", api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let envelope: GeminiFileEnvelope = ensure_success(response, "Gemini upload")
            .await?
            .json()
            .await?;

        debug!(
            "Uploaded {} ({} bytes) as {}",
            media.path.display(),
            size,
            envelope.file.name
        );
        Ok(envelope.file)
    }

    /// Poll the file until the service has processed it
    async fn wait_until_active(&self, api_key: &str, mut file: GeminiFile) -> Result<GeminiFile> {
        let mut checks = 0;

        while file.state != FILE_STATE_ACTIVE {
            if file.state == FILE_STATE_FAILED {
                bail!("Gemini failed to process {}", file.name);
            }
            if checks >= self.config.file_poll_attempts {
                bail!(
                    "{} still {} after {} status checks",
                    file.name,
                    file.state,
                    checks
                );
            }
            checks += 1;
            tokio::time::sleep(Duration::from_millis(self.config.file_poll_interval_ms)).await;

            let response = self
                .client
                .get(format!("{}/{}", self.base_url(), file.name))
                .header("x-goog-api-key", api_key)
                .send()
                .await?;
            file = ensure_success(response, "Gemini file status")
                .await?
                .json()
                .await?;
        }

        Ok(file)
    }

    async fn generate(&self, api_key: &str, parts: Vec<GeminiPart>) -> Result<LLMResponse> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url(),
            self.config.model
        );

        debug!("Sending request to Gemini model {}", self.config.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;
        let gemini_response: GeminiResponse = ensure_success(response, "Gemini API")
            .await?
            .json()
            .await?;

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| anyhow!("No candidates in Gemini response"))?;

        let content = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Empty Gemini response (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                )
            })?;

        let tokens_used = gemini_response
            .usage_metadata
            .and_then(|u| u.total_token_count);

        Ok(LLMResponse {
            content,
            tokens_used,
        })
    }
}

/// Gemini has no system role in `contents`; fold everything into one user turn
fn fold_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|msg| {
            if msg.role == "user" {
                msg.content.clone()
            } else {
                format!("{}: {}", msg.role, msg.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl LLM for GeminiProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        self.generate(api_key, vec![GeminiPart::text(fold_messages(&messages))])
            .await
    }

    fn supports_media(&self) -> bool {
        true
    }

    async fn chat_with_media(
        &self,
        messages: Vec<ChatMessage>,
        media: &[MediaAttachment],
    ) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        let mut parts = vec![GeminiPart::text(fold_messages(&messages))];

        for attachment in media {
            info!("📤 Uploading {} to Gemini", attachment.path.display());
            let uploaded = self.upload_file(api_key, attachment).await?;
            let file = self.wait_until_active(api_key, uploaded).await?;
            parts.push(GeminiPart::file(&file, attachment.mime_type));
        }

        self.generate(api_key, parts).await
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// OpenAI-compatible provider implementation
pub struct OpenAIProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u32,
}

impl OpenAIProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        // A custom endpoint (LM Studio and friends) may run without a key
        if config.api_key.is_none() && config.endpoint.is_none() {
            return Err(anyhow!("OpenAI API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl LLM for OpenAIProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let request = OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let base = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{}/chat/completions", base);

        debug!("Sending request to OpenAI-compatible API at {}", base);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await?;
        let openai_response: OpenAIResponse = ensure_success(response, "OpenAI API")
            .await?
            .json()
            .await?;

        let content = openai_response
            .choices
            .first()
            .ok_or_else(|| anyhow!("No response from OpenAI"))?
            .message
            .content
            .clone();

        let tokens_used = openai_response.usage.map(|u| u.total_tokens);

        Ok(LLMResponse {
            content,
            tokens_used,
        })
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::OpenAI
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
