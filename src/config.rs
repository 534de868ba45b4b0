use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::character::DevelopmentMode;
use crate::pipeline::ApprovalPolicy;
use crate::{wlog_debug, Error, Result};

/// Default timeout for a single generation call (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Which text backend drives the generation tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextBackendKind {
    /// Headless `claude -p` subprocess.
    #[default]
    ClaudeCli,
    /// OpenAI-compatible HTTP endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextBackendConfig {
    #[serde(default)]
    pub kind: TextBackendKind,
    pub command: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl TextBackendConfig {
    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageBackendConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub data_dir: Option<String>,
    #[serde(default)]
    pub approval: ApprovalPolicy,
    #[serde(default)]
    pub default_mode: DevelopmentMode,
    #[serde(default)]
    pub text: TextBackendConfig,
    #[serde(default)]
    pub image: ImageBackendConfig,
}

impl Config {
    pub fn weave_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".weave"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::weave_dir()?.join("weave.toml"))
    }

    /// Root directory holding one subdirectory per character.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::weave_dir()?.join("characters")),
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        wlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            wlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::parse(&fs::read_to_string(&path)?)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        wlog_debug!(
            "Config loaded: approval={:?}, text={:?}, mode={}",
            config.approval,
            config.text.kind,
            config.default_mode
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let weave_dir = Self::weave_dir()?;
        if !weave_dir.exists() {
            fs::create_dir_all(&weave_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        wlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
