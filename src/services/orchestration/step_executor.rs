//! Step Executor
//!
//! Runs a single step against the completion client. Each recognized step kind
//! gets its own prompt embedding the step description, its parameters, the task
//! context and the output of earlier completed steps. Model errors become
//! `StepResult::Error`; this module never fails the caller.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use opsdesk_core::{Step, StepKind, StepResult, StepStatus, Task};
use opsdesk_llm::CompletionClient;

use crate::models::settings::ExecutionSettings;

/// Limits on how much earlier-step output is fed into a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepExecutionConfig {
    /// Maximum characters kept from any one earlier step
    pub max_context_chars_per_step: usize,
    /// Maximum characters of earlier-step output across the whole prompt
    pub max_total_context_chars: usize,
}

impl Default for StepExecutionConfig {
    fn default() -> Self {
        Self {
            max_context_chars_per_step: 4000,
            max_total_context_chars: 16000,
        }
    }
}

impl From<&ExecutionSettings> for StepExecutionConfig {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            max_context_chars_per_step: settings.max_context_chars_per_step,
            max_total_context_chars: settings.max_total_context_chars,
        }
    }
}

/// Output of an earlier step, as handed to a later prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorOutput {
    pub step_id: String,
    pub description: String,
    pub content: String,
}

pub struct StepExecutor {
    client: Arc<dyn CompletionClient>,
    config: StepExecutionConfig,
}

impl StepExecutor {
    pub fn new(client: Arc<dyn CompletionClient>, config: StepExecutionConfig) -> Self {
        Self { client, config }
    }

    /// Execute `step` in the context of `task`.
    ///
    /// Unrecognized step kinds fail without calling the model.
    pub async fn execute(&self, step: &Step, task: &Task) -> StepResult {
        let instruction = match &step.kind {
            StepKind::Analysis => "Please analyze the given information and provide insights.",
            StepKind::Action => "Please execute the requested action and provide the result.",
            StepKind::Unrecognized(raw) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    step_id = %step.id,
                    step_type = %raw,
                    "unknown step type"
                );
                return StepResult::error(format!("Unknown step type: {}", raw));
            }
        };

        let prior = truncate_prior_outputs(
            prior_outputs(task, &step.id),
            self.config.max_context_chars_per_step,
            self.config.max_total_context_chars,
        );
        let prompt = build_step_prompt(step, task, &prior, instruction);

        let start = Instant::now();
        let response = self.client.complete(&prompt, None).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(text) => {
                tracing::debug!(
                    task_id = %task.task_id,
                    step_id = %step.id,
                    elapsed_ms,
                    response_chars = text.len(),
                    "step completed"
                );
                StepResult::success(interpret_response(text))
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task.task_id,
                    step_id = %step.id,
                    elapsed_ms,
                    error = %e,
                    "step failed"
                );
                StepResult::error(e.to_string())
            }
        }
    }
}

/// Results of completed steps that precede `step_id`, in order.
pub fn prior_outputs(task: &Task, step_id: &str) -> Vec<PriorOutput> {
    task.steps
        .iter()
        .take_while(|s| s.id != step_id)
        .filter(|s| s.status == StepStatus::Completed)
        .filter_map(|s| {
            s.result.as_ref().map(|result| PriorOutput {
                step_id: s.id.clone(),
                description: s.description.clone(),
                content: result.as_text(),
            })
        })
        .collect()
}

/// Clip earlier outputs to the per-step and total character limits.
///
/// Outputs are taken in order until the total budget runs out; the rest are
/// dropped. Counting is in chars so multi-byte text is never split.
pub fn truncate_prior_outputs(
    outputs: Vec<PriorOutput>,
    max_per_step: usize,
    max_total: usize,
) -> Vec<PriorOutput> {
    let mut total_chars = 0;
    let mut result = Vec::new();

    for mut output in outputs {
        if total_chars >= max_total {
            break;
        }

        let limit = (max_total - total_chars).min(max_per_step);
        let char_count = output.content.chars().count();
        if char_count > limit {
            let kept: String = output.content.chars().take(limit).collect();
            output.content = format!("{}...\n[Truncated, {} chars total]", kept, char_count);
            total_chars += limit;
        } else {
            total_chars += char_count;
        }
        result.push(output);
    }

    result
}

fn build_step_prompt(step: &Step, task: &Task, prior: &[PriorOutput], instruction: &str) -> String {
    let parameters =
        serde_json::to_string_pretty(&step.parameters).unwrap_or_else(|_| "{}".to_string());
    let context = serde_json::to_string_pretty(&task.context).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        "Step Description: {}\nParameters: {}\nContext: {}\n",
        step.description, parameters, context
    );

    if !prior.is_empty() {
        prompt.push_str("\nResults of previous steps:\n");
        for output in prior {
            prompt.push_str(&format!(
                "### {} ({})\n{}\n\n",
                output.step_id, output.description, output.content
            ));
        }
    }

    prompt.push('\n');
    prompt.push_str(instruction);
    prompt
}

/// JSON objects and arrays are kept structured; everything else stays text.
fn interpret_response(text: String) -> Value {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(text),
    }
}
