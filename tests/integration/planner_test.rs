//! Step Planner Integration Tests
//!
//! Planner behavior through the completion boundary:
//! - Fenced and bare JSON plans
//! - Graceful degrade to an empty plan
//! - Completion errors degrade to an empty plan too

use serde_json::{json, Map};

use opsdesk::services::orchestration::StepPlanner;
use opsdesk_core::{StepKind, StepStatus};

use crate::support::{network_error, ok, plan, ScriptedClient};

#[tokio::test]
async fn test_plan_from_fenced_response() {
    let client = ScriptedClient::new(vec![ok(format!(
        "```json\n{}\n```",
        plan(&["analysis", "action"])
    ))]);
    let planner = StepPlanner::new(client.clone());

    let steps = planner.plan("Clear /tmp on build agents", &Map::new()).await;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].id, "step_1");
    assert_eq!(steps[0].kind, StepKind::Analysis);
    assert_eq!(steps[1].id, "step_2");
    assert_eq!(steps[1].kind, StepKind::Action);
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending && s.result.is_none()));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_prompt_carries_description_and_context() {
    let client = ScriptedClient::new(vec![ok("[]")]);
    let planner = StepPlanner::new(client.clone());
    let mut context = Map::new();
    context.insert("ticket".to_string(), json!("INC-4411"));

    planner.plan("Investigate VPN drops", &context).await;

    let prompt = &client.prompts()[0];
    assert!(prompt.contains("Investigate VPN drops"));
    assert!(prompt.contains("INC-4411"));
    assert!(prompt.contains("JSON array"));
}

#[tokio::test]
async fn test_unparsable_plan_degrades_to_empty() {
    let client = ScriptedClient::new(vec![ok("1. Check the logs\n2. Restart the service")]);
    let planner = StepPlanner::new(client);

    let steps = planner.plan("Fix mail relay", &Map::new()).await;
    assert!(steps.is_empty());
}

#[tokio::test]
async fn test_empty_description_still_planned() {
    let client = ScriptedClient::new(vec![ok(plan(&["analysis"]))]);
    let planner = StepPlanner::new(client.clone());

    let steps = planner.plan("", &Map::new()).await;
    assert_eq!(steps.len(), 1);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_completion_error_degrades_to_empty_plan() {
    let client = ScriptedClient::new(vec![network_error("dns failure")]);
    let planner = StepPlanner::new(client.clone());

    let steps = planner.plan("Rotate certificates", &Map::new()).await;
    assert!(steps.is_empty());
    assert_eq!(client.calls(), 1);
}
