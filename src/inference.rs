//! Remote inference: request shape, credentials, and the OpenAI transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result, SynthConfig};

pub const SYSTEM_PROMPT: &str = "You are an expert web developer who specializes in tailwind css.
A user will provide you with a low-fidelity wireframe of an application.
You will return a single html file that uses HTML, tailwind css, and JavaScript to create a high fidelity website.
Include any extra CSS and JavaScript in the html file.
If you have any images, load them from Unsplash or use solid colored rectangles.
The user will provide you with notes in blue or red text, arrows, or drawings.
The user may also include images of other websites as style references. Transfer the styles as best as you can, matching fonts / colors / layouts.
They may also provide you with the html of a previous design that they want you to iterate from.
Carry out any changes they request from you.
In the wireframe, the previous design's html will appear as a white rectangle.
Use creative license to make the application more fleshed out.
Use JavaScript modules and unpkg to import any necessary dependencies.

Respond ONLY with the contents of the html file.";

pub const USER_INSTRUCTION: &str = "Turn this into a single html file using tailwind.";

/// Environment variable holding the process-level API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// One synthesis call's input, as it crosses the local service boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Captured wireframe as a `data:` URI
    pub image: String,
    /// Previous page markup or the no-prior-art sentinel
    #[serde(rename = "html")]
    pub prior_markup: String,
    /// Key typed in by the user, used only when the process has none
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

// ---- chat completion wire types ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    #[default]
    High,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// Build the single-turn vision request for one synthesis call.
pub fn build_request(config: &SynthConfig, image: &str, prior_markup: &str) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        messages: vec![
            ChatMessage {
                role: "system".into(),
                content: MessageContent::Text(SYSTEM_PROMPT.into()),
            },
            ChatMessage {
                role: "user".into(),
                content: MessageContent::Parts(vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.to_string(),
                            detail: config.image_detail,
                        },
                    },
                    ContentPart::Text { text: USER_INSTRUCTION.into() },
                    ContentPart::Text { text: prior_markup.to_string() },
                ]),
            },
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

/// A chat completion: candidate messages, or a structured error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionPayload {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::RemoteError(format!("unexpected completion payload: {e}")))
    }

    /// Text of the first candidate message
    pub fn primary_text(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }

    /// Turn a structured error body into `Error::ApiError`.
    pub fn into_result(self, preview_len: usize) -> Result<Self> {
        match &self.error {
            Some(body) => {
                let message = body.message.as_deref().unwrap_or("Unknown API error");
                Err(Error::api(message, preview_len))
            }
            None => Ok(self),
        }
    }
}

// ---- credentials ----

/// Where the process-level key comes from.
#[derive(Debug, Clone, Default)]
pub enum ProcessKey {
    /// Read `OPENAI_API_KEY` on every call
    #[default]
    Environment,
    Fixed(Option<String>),
}

impl ProcessKey {
    pub fn get(&self) -> Option<String> {
        match self {
            ProcessKey::Environment => non_empty(std::env::var(API_KEY_ENV).ok()),
            ProcessKey::Fixed(key) => non_empty(key.clone()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The process key wins over the caller key; neither is `MissingCredentials`.
pub fn resolve_api_key(process: Option<String>, caller: Option<&str>) -> Result<String> {
    if let Some(key) = non_empty(process) {
        return Ok(key);
    }
    log::info!("No {API_KEY_ENV} configured for the process, using the caller-supplied key");
    non_empty(caller.map(str::to_string)).ok_or(Error::MissingCredentials)
}

/// Seam between the orchestrator and whatever reaches the model.
#[async_trait]
pub trait Inference: Send + Sync {
    /// One attempt; a structured error body comes back as `Error::ApiError`.
    async fn infer(&self, request: &SynthesisRequest) -> Result<CompletionPayload>;
}

/// Direct client for an OpenAI-compatible chat completions endpoint.
#[cfg(feature = "openai")]
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: SynthConfig,
    process_key: ProcessKey,
}

#[cfg(feature = "openai")]
impl OpenAiClient {
    pub fn new(config: SynthConfig, process_key: ProcessKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config, process_key })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Send one request and return the response body untouched, including
    /// structured error bodies.
    pub async fn send_raw(&self, request: &SynthesisRequest) -> Result<Value> {
        let key = resolve_api_key(self.process_key.get(), request.api_key.as_deref())?;
        let body = build_request(&self.config, &request.image, &request.prior_markup);

        let resp = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::warn!("inference request to {} failed: {e}", self.config.endpoint);
                Error::RemoteError(e.to_string())
            })?;

        let status = resp.status();
        let text = resp.text().await?;
        log::debug!("inference endpoint answered {status} ({} bytes)", text.len());

        let value: Value = serde_json::from_str(&text).map_err(|_| {
            Error::RemoteError(format!(
                "endpoint returned {status} with a non-JSON body: {}",
                truncate(&text, self.config.error_preview_len)
            ))
        })?;
        if !status.is_success() && value.get("error").is_none() {
            return Err(Error::RemoteError(format!(
                "endpoint returned {status}: {}",
                truncate(&text, self.config.error_preview_len)
            )));
        }
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            log::warn!("inference endpoint reported an error: {}", truncate(message, 200));
        }
        Ok(value)
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl Inference for OpenAiClient {
    async fn infer(&self, request: &SynthesisRequest) -> Result<CompletionPayload> {
        let value = self.send_raw(request).await?;
        CompletionPayload::from_value(value)?.into_result(self.config.error_preview_len)
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
