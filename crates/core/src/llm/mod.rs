//! LLM client and the LLM-backed default stage tasks.

mod client;
mod config;
mod stage_task;

pub use client::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, OllamaClient};
pub use config::{LlmConfig, LlmProvider};
pub use stage_task::{build_llm_registry, LlmStageTask};
