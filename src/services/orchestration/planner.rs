//! Step Planner
//!
//! Turns a task description and context into an ordered list of typed steps by
//! asking the completion client for a JSON array.
//!
//! Parsing is deliberately forgiving. Markdown fences around the JSON are
//! stripped, a `{"steps": [...]}` wrapper is accepted, and anything that still
//! does not parse, or a failed completion call, yields an empty plan rather
//! than an error. A task with zero
//! steps is valid and completes immediately when executed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use opsdesk_core::{Step, StepKind};
use opsdesk_llm::CompletionClient;

/// Produces step lists for new tasks.
pub struct StepPlanner {
    client: Arc<dyn CompletionClient>,
}

impl StepPlanner {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Plan the steps for a task.
    ///
    /// Never fails: a completion error or unparsable output yields an empty
    /// plan, which executes as a no-op.
    pub async fn plan(&self, description: &str, context: &Map<String, Value>) -> Vec<Step> {
        let prompt = build_planning_prompt(description, context);
        tracing::debug!(prompt_chars = prompt.len(), "requesting step plan");

        let raw = match self.client.complete(&prompt, None).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "planning request failed, continuing with no steps"
                );
                return Vec::new();
            }
        };

        let steps = match parse_steps(&raw, Utc::now()) {
            Ok(steps) => steps,
            Err(reason) => {
                tracing::warn!(
                    reason = %reason,
                    response_chars = raw.len(),
                    "planner output was not a step list, continuing with no steps"
                );
                Vec::new()
            }
        };

        tracing::info!(steps = steps.len(), "step plan ready");
        steps
    }
}

/// Prompt asking for a bare JSON array of steps.
pub fn build_planning_prompt(description: &str, context: &Map<String, Value>) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "Task Description: {description}\n\
         Context: {context_json}\n\n\
         Please plan the steps needed to complete this task. Each step should have:\n\
         1. A unique ID (step_1, step_2, etc.)\n\
         2. A description\n\
         3. A type (analysis or action)\n\
         4. Required parameters\n\n\
         Return the steps as a JSON array of objects with the keys \"id\", \"description\", \
         \"type\" and \"parameters\", without any markdown formatting."
    )
}

/// Parse model output into steps with fresh lifecycle fields.
///
/// Returns `Err(reason)` when the output is not a step list at all. Ids are
/// always reassigned as `step_<n>` in output order, whatever the model sent.
pub fn parse_steps(raw: &str, now: DateTime<Utc>) -> Result<Vec<Step>, String> {
    let body = strip_code_fence(raw);
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("steps") {
            Some(Value::Array(items)) => items,
            _ => return Err("JSON object without a 'steps' array".to_string()),
        },
        other => return Err(format!("expected a JSON array, got {}", json_kind(&other))),
    };

    let mut steps = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(fields) => steps.push(parse_step(steps.len() + 1, fields, now)),
            other => {
                tracing::warn!(kind = json_kind(&other), "skipping non-object step entry");
            }
        }
    }
    Ok(steps)
}

fn parse_step(position: usize, mut fields: Map<String, Value>, now: DateTime<Utc>) -> Step {
    let description = ["description", "name", "title"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string();

    let kind = match fields.get("type").and_then(|v| v.as_str()) {
        Some(raw) => StepKind::from(raw),
        None => StepKind::Unrecognized("unspecified".to_string()),
    };

    let parameters = match fields.remove("parameters") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Step::planned(position, description, kind, parameters, now)
}

/// Trim the response and peel one surrounding markdown code fence.
///
/// The opening fence line (with any language tag) is dropped; a closing fence
/// is dropped only if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
