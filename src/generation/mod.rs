//! Generation boundary: the text and image backends that tasks call.
//!
//! Backends are consumed through two object-safe traits so the pipeline can
//! run against the headless Claude CLI, an OpenAI-compatible endpoint, or a
//! scripted generator in tests.

mod claude;
mod http;

pub use claude::{ClaudeCli, ClaudeResponse, ResultType};
pub use http::HttpBackend;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wlog_debug;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool the model may invoke instead of answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on `Role::Tool` turns: which invocation this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `Role::Assistant` turns that requested tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: calls,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            turns: vec![Turn::user(user)],
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// A backend reply: final text, or tool invocations awaiting results.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub style_context: String,
}

/// Where a generated image ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    /// Raw encoded bytes the caller must persist.
    Bytes { data: Vec<u8>, extension: String },
    /// Already stored by the backend.
    Path(PathBuf),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageArtifact {
    pub data: ImageData,
    pub narrative: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageArtifact>;
}

/// Run a tool-free request and return its text.
pub async fn complete_text(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<String> {
    match generator.generate(request).await? {
        Generation::Text(text) => Ok(text),
        Generation::ToolCalls(calls) => Err(Error::Generation(format!(
            "{} requested {} tool call(s) on a request that offered none",
            generator.name(),
            calls.len()
        ))),
    }
}

/// Drive the tool-call protocol until the model answers with text.
///
/// Every invocation gets a result from `handler`; the conversation is
/// resubmitted with the assistant's calls and the results appended.
///
/// The wave tasks never offer tools and go through [`complete_text`]. This
/// loop serves callers that build their own conversations on the same
/// backends, such as concept-gathering or scene-refinement agents.
pub async fn converse<F>(
    generator: &dyn TextGenerator,
    mut request: GenerationRequest,
    max_rounds: usize,
    mut handler: F,
) -> Result<String>
where
    F: FnMut(&ToolCall) -> Result<String> + Send,
{
    for round in 0..=max_rounds {
        match generator.generate(&request).await? {
            Generation::Text(text) => return Ok(text),
            Generation::ToolCalls(calls) => {
                if round == max_rounds {
                    break;
                }
                wlog_debug!(
                    "[generation] {} round {} invoked {} tool(s)",
                    generator.name(),
                    round,
                    calls.len()
                );
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(Turn::tool_result(call.id.clone(), handler(call)?));
                }
                request.turns.push(Turn::assistant_tool_calls(calls));
                request.turns.extend(results);
            }
        }
    }
    Err(Error::Generation(format!(
        "{} still invoking tools after {} rounds",
        generator.name(),
        max_rounds
    )))
}
