//! Webhook routing.
//!
//! Content events go to planning, pipeline events to monitoring, everything
//! else to reporting.

use crate::approval::{ActionParams, ContextMap};
use crate::capability::CapabilityKind;
use serde_json::Value;

const CONTENT_EVENTS: &[&str] = &["issues", "pull_request", "push"];
const PIPELINE_EVENTS: &[&str] = &["workflow_run", "workflow_job", "check_run", "check_suite"];

pub fn route(event_type: &str) -> CapabilityKind {
    if CONTENT_EVENTS.contains(&event_type) {
        CapabilityKind::Planning
    } else if PIPELINE_EVENTS.contains(&event_type) {
        CapabilityKind::Monitoring
    } else {
        CapabilityKind::Reporting
    }
}

/// Parameters of the approval request for a webhook event.
pub fn webhook_action(event_type: &str, payload: &Value) -> ActionParams {
    let repository = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    ActionParams::new()
        .with("event_type", event_type)
        .with("repository", repository)
        .with("action", action)
}

/// Project context plus the raw payload.
pub fn webhook_context(project: ContextMap, payload: &Value) -> ContextMap {
    let mut context = project;
    context.insert("webhook_payload".to_string(), payload.clone());
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_table() {
        for event in ["issues", "pull_request", "push"] {
            assert_eq!(route(event), CapabilityKind::Planning, "{}", event);
        }
        for event in ["workflow_run", "workflow_job", "check_run", "check_suite"] {
            assert_eq!(route(event), CapabilityKind::Monitoring, "{}", event);
        }
        for event in ["release", "star", ""] {
            assert_eq!(route(event), CapabilityKind::Reporting, "{}", event);
        }
    }

    #[test]
    fn test_action_from_payload() {
        let payload = json!({
            "action": "opened",
            "repository": { "full_name": "acme/widgets" }
        });
        let action = webhook_action("issues", &payload);
        let keys: Vec<&str> = action.keys().collect();
        assert_eq!(keys, vec!["event_type", "repository", "action"]);
        assert_eq!(action.get("repository").and_then(|v| v.as_str()), Some("acme/widgets"));
        assert_eq!(action.get("action").and_then(|v| v.as_str()), Some("opened"));
    }

    #[test]
    fn test_missing_payload_fields_are_unknown() {
        let action = webhook_action("push", &json!({ "repository": {} }));
        assert_eq!(action.get("repository").and_then(|v| v.as_str()), Some("unknown"));
        assert_eq!(action.get("action").and_then(|v| v.as_str()), Some("unknown"));
    }

    #[test]
    fn test_context_keeps_project_fields() {
        let mut project = ContextMap::new();
        project.insert("project_name".to_string(), json!("Widgets"));
        let context = webhook_context(project, &json!({ "action": "closed" }));
        assert_eq!(context["project_name"], "Widgets");
        assert_eq!(context["webhook_payload"]["action"], "closed");
    }
}
