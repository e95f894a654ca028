//! Configuration system for Kestrel.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Configuration is
//! loaded from `<config_dir>/kestrel/config.toml` and/or `.kestrel/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KestrelConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Text-generation backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name; only OpenAI-compatible chat endpoints are supported.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Inline key. Prefer `api_key_env` so the key stays out of files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
    /// Per-call timeout for finding explanations.
    pub timeout_secs: u64,
    /// Per-call timeout for the overall narrative.
    pub summary_timeout_secs: u64,
    pub max_tokens: u32,
    pub summary_max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compatible".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 45,
            summary_timeout_secs: 60,
            max_tokens: 300,
            summary_max_tokens: 900,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key: the inline value wins, then the named env var.
    /// Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Directory holding the Markdown knowledge corpus.
    pub knowledge_path: PathBuf,
    pub max_chunk_chars: usize,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            knowledge_path: PathBuf::from("docs/knowledge/karpenter"),
            max_chunk_chars: 800,
            top_k: 3,
        }
    }
}

/// Default feature switches for analysis runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub enable_explanations: bool,
    #[serde(default)]
    pub enable_evaluator: bool,
    #[serde(default)]
    pub enable_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl KestrelConfig {
    /// Check cross-field constraints figment cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.max_chunk_chars == 0 {
            return Err(ConfigError::Invalid {
                message: "rag.max_chunk_chars must be greater than zero".into(),
            });
        }
        if self.llm.timeout_secs == 0 || self.llm.summary_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "llm timeouts must be greater than zero".into(),
            });
        }
        if url::Url::parse(&self.llm.base_url).is_err() {
            return Err(ConfigError::Invalid {
                message: format!("llm.base_url is not a valid URL: {}", self.llm.base_url),
            });
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "kestrel", "kestrel")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `KESTREL_`, nested with `__`)
/// 3. Workspace-local config (`.kestrel/config.toml`)
/// 4. User config (`<config_dir>/kestrel/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&KestrelConfig>,
) -> Result<KestrelConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(KestrelConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".kestrel").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // KESTREL_LLM__MODEL, KESTREL_RAG__TOP_K, ...
    figment = figment.merge(Env::prefixed("KESTREL_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: KestrelConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from one explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<KestrelConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let config: KestrelConfig = Figment::from(Serialized::defaults(KestrelConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Render a configuration as TOML, with any inline API key masked.
pub fn render_config(config: &KestrelConfig) -> Result<String, ConfigError> {
    let mut masked = config.clone();
    if masked.llm.api_key.is_some() {
        masked.llm.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&masked).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
