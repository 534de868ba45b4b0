//! OpenAI-compatible HTTP backend for both text and image generation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{
    Generation, GenerationRequest, ImageArtifact, ImageData, ImageGenerator, ImageRequest, Role,
    TextGenerator, ToolCall,
};
use crate::config::{ImageBackendConfig, TextBackendConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::wlog_debug;

const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction<'a>,
}

#[derive(Serialize)]
struct ChatFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ChatToolCallFunction,
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatToolCallFunction {
    name: String,
    /// JSON-encoded arguments, as the wire format carries them.
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u32,
    size: &'a str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    image_size: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_image_size(mut self, size: impl Into<String>) -> Self {
        self.image_size = size.into();
        self
    }

    pub fn from_text_config(config: &TextBackendConfig) -> Result<Self> {
        Ok(Self::new(
            config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            config.model.as_deref().unwrap_or("local-model"),
            config.timeout(),
        )?
        .with_api_key(read_api_key(config.api_key_env.as_deref())?))
    }

    pub fn from_image_config(config: &ImageBackendConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("[image] base_url is not set".to_string()))?;
        Ok(Self::new(
            base_url,
            config.model.as_deref().unwrap_or("local-image-model"),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )?
        .with_api_key(read_api_key(config.api_key_env.as_deref())?)
        .with_image_size(config.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn to_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(ChatMessage {
            role: "system".into(),
            content: Some(request.system.clone()),
            tool_call_id: None,
            tool_calls: Vec::new(),
        });
        for turn in &request.turns {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            messages.push(ChatMessage {
                role: role.into(),
                content: Some(turn.content.clone()),
                tool_call_id: turn.tool_call_id.clone(),
                tool_calls: turn
                    .tool_calls
                    .iter()
                    .map(|call| ChatToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: ChatToolCallFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            });
        }
        messages
    }

    fn from_message(message: ChatMessage) -> Result<Generation> {
        if !message.tool_calls.is_empty() {
            let calls = message
                .tool_calls
                .into_iter()
                .map(|call| {
                    let arguments = serde_json::from_str(&call.function.arguments)
                        .unwrap_or(serde_json::Value::String(call.function.arguments));
                    ToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments,
                    }
                })
                .collect();
            return Ok(Generation::ToolCalls(calls));
        }
        message
            .content
            .map(Generation::Text)
            .ok_or_else(|| Error::Generation("response carried neither content nor tool calls".into()))
    }
}

fn read_api_key(env_var: Option<&str>) -> Result<Option<String>> {
    match env_var {
        None => Ok(None),
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| Error::Config(format!("environment variable {} is not set", name))),
    }
}

#[async_trait]
impl TextGenerator for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: Self::to_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request
                .tools
                .iter()
                .map(|tool| ChatTool {
                    kind: "function",
                    function: ChatFunction {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
        };
        wlog_debug!("[http] chat completion model={} turns={}", self.model, request.turns.len());

        let response: ChatCompletionResponse = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Generation("completion returned no choices".into()))?;
        Self::from_message(choice.message)
    }
}

#[async_trait]
impl ImageGenerator for HttpBackend {
    fn name(&self) -> &str {
        "http-images"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageArtifact> {
        let body = ImageGenerationRequest {
            model: &self.model,
            prompt: format!("{}\n\nStyle: {}", request.prompt, request.style_context),
            n: 1,
            size: &self.image_size,
            response_format: "b64_json",
        };
        wlog_debug!("[http] image generation model={} size={}", self.model, self.image_size);

        let response: ImageGenerationResponse = self
            .post("images/generations")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let datum = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::Generation("image endpoint returned no data".into()))?;
        let narrative = datum.revised_prompt.unwrap_or_else(|| request.prompt.clone());

        let data = match (datum.b64_json, datum.url) {
            (Some(encoded), _) => ImageData::Bytes {
                data: base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| Error::Generation(format!("invalid image payload: {}", e)))?,
                extension: "png".to_string(),
            },
            (None, Some(url)) => ImageData::Url(url),
            (None, None) => {
                return Err(Error::Generation("image response had no payload".into()));
            }
        };
        Ok(ImageArtifact { data, narrative })
    }
}
