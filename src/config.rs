//! Run configuration, assembled once at startup and passed into constructors.
//!
//! Nothing below the binary reads the environment on its own. The binary
//! builds an [`AppConfig`] from flags (with env fallbacks); library users can
//! call [`AppConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::consts::{
    DEFAULT_LLM_ENDPOINT, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL_PATH,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SEARCH_ENDPOINT, DEFAULT_SEARCH_RESULTS,
    DEFAULT_TOOL_TIMEOUT_SECS, ENV_LLM_ENDPOINT, ENV_MODEL_PATH, ENV_SEARCH_API_KEY,
    ENV_SEARCH_API_KEY_LEGACY, default_db_path,
};
use crate::llm::SamplingParams;
use crate::llm::llama::PromptTemplate;

/// How to reach the language model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Quantized weights file. Must exist before a run starts.
    pub path: PathBuf,
    /// Base URL of the llama.cpp server serving `path`.
    pub endpoint: String,
    pub template: PromptTemplate,
    pub params: SamplingParams,
    /// Longest silence tolerated from the backend, between streamed chunks
    /// or before a buffered reply.
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            template: PromptTemplate::Llama2Chat,
            params: SamplingParams::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Web search used by the research role.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Absent keys are fine until the tool is actually called.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub num_results: usize,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            num_results: DEFAULT_SEARCH_RESULTS,
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub search: SearchConfig,
    /// Model calls each agent may spend in its tool loop.
    pub max_iterations: usize,
    /// Echo tokens to the terminal as they are generated.
    pub stream: bool,
    /// Report archive. `":memory:"` keeps nothing between runs.
    pub db_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stream: true,
            db_path: default_db_path().to_string_lossy().into_owned(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with `.env` and process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        config.search.api_key = search_api_key_from_env();
        if let Some(path) = non_empty_var(ENV_MODEL_PATH) {
            config.model.path = PathBuf::from(path);
        }
        if let Some(endpoint) = non_empty_var(ENV_LLM_ENDPOINT) {
            config.model.endpoint = endpoint;
        }
        config
    }

    /// Reject settings the backend would silently clamp or misinterpret.
    pub fn validate(&self) -> Result<()> {
        let params = &self.model.params;
        if !(0.0..=2.0).contains(&params.temperature) {
            bail!("temperature must be within [0, 2], got {}", params.temperature);
        }
        if !(params.top_p > 0.0 && params.top_p <= 1.0) {
            bail!("top_p must be within (0, 1], got {}", params.top_p);
        }
        if params.max_tokens == 0 {
            bail!("max_tokens must be greater than zero");
        }
        if self.max_iterations == 0 {
            bail!("max_iterations must be greater than zero");
        }
        if self.model.endpoint.trim().is_empty() {
            bail!("model endpoint must not be empty");
        }
        Ok(())
    }
}

/// `SERPER_API_KEY`, or the legacy hyphenated key some `.env` files use.
pub fn search_api_key_from_env() -> Option<String> {
    non_empty_var(ENV_SEARCH_API_KEY).or_else(|| non_empty_var(ENV_SEARCH_API_KEY_LEGACY))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
