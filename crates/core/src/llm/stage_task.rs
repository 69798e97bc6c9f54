//! Stage tasks backed by an LLM.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::{Document, Stage};
use crate::metrics;
use crate::task::{StageTask, TaskError, TaskRegistry, TaskResult};

use super::client::{CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You are an expert document analyst working on one step of a \
document processing pipeline. Reply with a single valid JSON object and nothing else.";

/// Fields the model is asked to produce for each stage.
fn stage_instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Captured => {
            "Capture the document. Provide: title, source_type (note, article, email, ...), \
             language, and a one-paragraph summary."
        }
        Stage::Contextualized => {
            "Contextualize the document. Provide: document_type, topics (list), entities \
             (people, organizations, products), related_domains (list), and context_notes."
        }
        Stage::Clarified => {
            "Clarify the document. Provide: complex_terms (object of term to explanation), \
             ambiguous_concepts (list), implicit_assumptions (list), and clarification_notes."
        }
        Stage::Categorized => {
            "Categorize the document. Provide: primary_category, secondary_categories (list), \
             tags (list), relevance_scores (object of domain to score 0-10), and \
             classification_notes."
        }
        Stage::Crystallized => {
            "Crystallize the document. Provide: executive_summary (3-5 sentences), key_points \
             (list), core_concepts (list), conclusions, and questions_raised (list)."
        }
        Stage::Connected => {
            "Connect the document. Provide: related_concepts (list), potential_references \
             (list), document_connections (list of objects with document_id, connection_type, \
             strength 1-10), dependency_chain (list), and connection_notes."
        }
        Stage::Created | Stage::Error => "",
    }
}

/// Runs one stage by prompting an LLM.
///
/// The reply is stored as the stage payload: parsed as a JSON object when
/// possible, otherwise wrapped as `{"text": ...}`.
pub struct LlmStageTask {
    stage: Stage,
    name: &'static str,
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmStageTask {
    /// Returns `None` for stages that have no task.
    pub fn new(stage: Stage, client: Arc<dyn LlmClient>) -> Option<Self> {
        let name = stage.task_name()?;
        Some(Self {
            stage,
            name,
            client,
            max_tokens: 1000,
            temperature: 0.3,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_prompt(&self, document: &Document) -> String {
        let mut prompt = format!(
            "{}\n\nDocument content:\n{}\n",
            stage_instructions(self.stage),
            document.content
        );
        if !document.stage_results.is_empty() {
            let previous = serde_json::to_string_pretty(&document.stage_results)
                .unwrap_or_default();
            prompt.push_str("\nResults of earlier stages:\n");
            prompt.push_str(&previous);
            prompt.push('\n');
        }
        prompt
    }
}

/// Parse a model reply into a stage payload.
fn parse_reply(reply: &str) -> serde_json::Value {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str::<serde_json::Value>(unfenced) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::json!({ "text": trimmed }),
    }
}

#[async_trait]
impl StageTask for LlmStageTask {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, document: &Document) -> Result<TaskResult, TaskError> {
        let request = CompletionRequest::new(self.build_prompt(document))
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .expect_json();

        let response = self.client.complete(request).await?;

        metrics::LLM_TOKENS
            .with_label_values(&[self.client.provider(), "input"])
            .inc_by(response.usage.input_tokens as u64);
        metrics::LLM_TOKENS
            .with_label_values(&[self.client.provider(), "output"])
            .inc_by(response.usage.output_tokens as u64);

        if response.text.trim().is_empty() {
            warn!("Empty {} reply for document {}", self.name, document.id);
            return Ok(TaskResult::failed("model returned an empty response"));
        }

        debug!(
            "{} produced {} chars for document {}",
            self.name,
            response.text.len(),
            document.id
        );
        Ok(TaskResult::ok(parse_reply(&response.text)))
    }
}

/// Build a registry with an LLM task for every stage.
pub fn build_llm_registry(
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    for stage in Stage::Created.following() {
        if let Some(task) = LlmStageTask::new(*stage, Arc::clone(&client)) {
            let task = task
                .with_max_tokens(max_tokens)
                .with_temperature(temperature);
            // Every following stage has a task slot.
            let _ = registry.register(*stage, Arc::new(task));
        }
    }
    registry
}
