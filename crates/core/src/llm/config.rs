//! LLM configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::client::{LlmClient, OllamaClient};

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
}

/// Configuration for the LLM-backed stage tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Model name (e.g. "mistral:7b-instruct").
    pub model: String,
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Build the client for the configured provider.
    pub fn build_client(&self) -> Arc<dyn LlmClient> {
        match self.provider {
            LlmProvider::Ollama => Arc::new(
                OllamaClient::new(&self.model)
                    .with_api_base(&self.api_base)
                    .with_timeout(Duration::from_secs(self.timeout_secs)),
            ),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout() -> u64 {
    120
}
