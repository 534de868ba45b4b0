//! Headless Claude CLI text backend.
//!
//! Runs `claude -p` with JSON output and a system prompt, one subprocess
//! per generation call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{Generation, GenerationRequest, Role, TextGenerator};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::{wlog_debug, wlog_trace};

/// The result type from a Claude execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultType {
    Success { output: String },
    Error { message: String },
}

/// Parsed response from one headless run.
#[derive(Debug, Clone)]
pub struct ClaudeResponse {
    pub session_id: Option<String>,
    pub result: ResultType,
    /// Cost in USD (if reported).
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
}

impl ClaudeResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ResultType::Success { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.result {
            ResultType::Success { output } => Some(output),
            ResultType::Error { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaudeResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClaudeCli {
    binary: PathBuf,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl ClaudeCli {
    /// Locate `command`'s binary on PATH. Extra words become leading args.
    pub fn from_command(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or("claude");
        let binary =
            which::which(program).map_err(|_| Error::BinaryNotFound(program.to_string()))?;
        Ok(Self {
            binary,
            extra_args: words.map(String::from).collect(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Use a specific binary path without looking it up.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            extra_args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Flatten the conversation into the single prompt `-p` accepts.
    pub fn render_prompt(request: &GenerationRequest) -> String {
        if let [only] = request.turns.as_slice() {
            if only.role == Role::User {
                return only.content.clone();
            }
        }
        request
            .turns
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                    Role::Tool => "Tool result",
                };
                format!("{}: {}", speaker, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub async fn execute(&self, system: &str, prompt: &str) -> Result<ClaudeResponse> {
        wlog_debug!(
            "[claude] executing {} (prompt {} chars)",
            self.binary.display(),
            prompt.len()
        );
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(&self.extra_args)
                .arg("-p")
                .arg(prompt)
                .arg("--output-format")
                .arg("json")
                .arg("--system-prompt")
                .arg(system)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(self.timeout))?
        .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        wlog_trace!("[claude] stdout: {}", stdout);

        if let Ok(response) = Self::parse_json_response(&stdout) {
            return Ok(response);
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "Claude execution failed with exit code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(ClaudeResponse {
                session_id: None,
                result: ResultType::Error { message },
                cost_usd: None,
                duration_ms: None,
            });
        }

        Ok(ClaudeResponse {
            session_id: None,
            result: ResultType::Success {
                output: stdout.trim().to_string(),
            },
            cost_usd: None,
            duration_ms: None,
        })
    }

    pub fn parse_json_response(json_str: &str) -> Result<ClaudeResponse> {
        let raw: RawClaudeResponse = serde_json::from_str(json_str)?;

        let result = match raw.subtype.as_deref() {
            Some("success") => ResultType::Success {
                output: raw.result.unwrap_or_default(),
            },
            Some("error") => ResultType::Error {
                message: raw.error.or(raw.result).unwrap_or_default(),
            },
            _ => {
                if let Some(error) = raw.error {
                    ResultType::Error { message: error }
                } else if let Some(result) = raw.result {
                    ResultType::Success { output: result }
                } else {
                    ResultType::Error {
                        message: "Unknown response format".to_string(),
                    }
                }
            }
        };

        Ok(ClaudeResponse {
            session_id: raw.session_id,
            result,
            cost_usd: raw.total_cost_usd,
            duration_ms: raw.duration_ms,
        })
    }
}

#[async_trait]
impl TextGenerator for ClaudeCli {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if !request.tools.is_empty() {
            return Err(Error::Generation(
                "claude CLI backend does not support tool invocation".to_string(),
            ));
        }
        let response = self
            .execute(&request.system, &Self::render_prompt(request))
            .await?;
        match response.result {
            ResultType::Success { output } => Ok(Generation::Text(output)),
            ResultType::Error { message } => Err(Error::Generation(message)),
        }
    }
}
