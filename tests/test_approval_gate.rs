//! Integration tests for the approval gate, driven by the scripted approver.

use pmcrew::approval::gate::{auto_approval, CANCELLED_MESSAGE, TIMEOUT_MESSAGE};
use pmcrew::approval::{
    ActionParams, ApprovalGate, ApprovalPolicy, ApprovalRequest, ApprovalSession, ApprovalStatus,
    ApproverChoice, ParamValue, ScriptStep, ScriptedApprover,
};
use pmcrew::ledger::InteractionLedger;
use pmcrew::risk::RiskLevel;
use std::sync::Arc;
use std::time::Duration;

fn policy(required: bool, auto_low: bool) -> ApprovalPolicy {
    ApprovalPolicy {
        human_approval_required: required,
        auto_approve_low_risk: auto_low,
        ..Default::default()
    }
}

fn gate_with(
    policy: ApprovalPolicy,
    steps: Vec<ScriptStep>,
) -> (ApprovalGate, Arc<ScriptedApprover>, Arc<InteractionLedger>) {
    let approver = Arc::new(ScriptedApprover::new(steps));
    let ledger = Arc::new(InteractionLedger::new());
    let gate = ApprovalGate::new(policy, ledger.clone(), approver.clone());
    (gate, approver, ledger)
}

fn issue_request(risk: RiskLevel) -> ApprovalRequest {
    ApprovalRequest::new(
        "create_issue",
        "Create tracking issue",
        ActionParams::new()
            .with("title", "Add search")
            .with("labels", vec!["feature".to_string()])
            .with("priority", 2i64),
        risk,
    )
}

fn approve() -> ScriptStep {
    ScriptStep::Choice(ApproverChoice::Approve)
}

// ── Auto-approval ──

#[tokio::test]
async fn test_low_risk_auto_approved_without_prompt() {
    let (gate, approver, ledger) = gate_with(policy(false, true), vec![]);
    let session = ApprovalSession::new();

    let resolution = gate.resolve(issue_request(RiskLevel::Low), &session).await;

    assert_eq!(resolution.status, ApprovalStatus::Approved);
    assert_eq!(resolution.message, "auto-approved (low risk)");
    assert_eq!(resolution.action, Some(issue_request(RiskLevel::Low).proposed_action().clone()));
    assert!(approver.events().is_empty());
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn test_not_required_stops_at_high_risk() {
    let (gate, approver, _) = gate_with(policy(false, false), vec![approve()]);
    let session = ApprovalSession::new();

    let medium = gate.resolve(issue_request(RiskLevel::Medium), &session).await;
    assert_eq!(medium.message, "auto-approved (approval not required)");
    assert!(approver.presented().is_empty());

    let high = gate.resolve(issue_request(RiskLevel::High), &session).await;
    assert_eq!(high.status, ApprovalStatus::Approved);
    assert_eq!(high.message, "approved by user");
    assert_eq!(approver.presented(), vec!["create_issue"]);
}

#[test]
fn test_required_policy_never_bypasses() {
    for risk in RiskLevel::ALL {
        assert_eq!(auto_approval(&policy(true, true), risk), None);
    }
}

// ── Interactive choices ──

#[tokio::test]
async fn test_reject_with_reason() {
    let (gate, _, ledger) = gate_with(policy(true, false), vec![ScriptStep::reject("not this sprint")]);
    let resolution = gate
        .resolve(issue_request(RiskLevel::Medium), &ApprovalSession::new())
        .await;

    assert_eq!(resolution.status, ApprovalStatus::Rejected);
    assert_eq!(resolution.message, "rejected by user: not this sprint");
    assert!(resolution.action.is_none());
    assert_eq!(ledger.entries()[0].status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn test_reject_without_reason() {
    let (gate, _, _) = gate_with(
        policy(true, false),
        vec![ScriptStep::Choice(ApproverChoice::Reject { reason: None })],
    );
    let resolution = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(resolution.message, "rejected by user");
}

#[tokio::test]
async fn test_modify_changes_only_edited_keys() {
    let (gate, approver, ledger) = gate_with(
        policy(true, false),
        vec![
            ScriptStep::Choice(ApproverChoice::Modify),
            ScriptStep::edit("title=Add fuzzy search"),
            ScriptStep::edit("priority=1"),
            ScriptStep::edit("done"),
        ],
    );
    let original = issue_request(RiskLevel::Medium);
    let before = original.proposed_action().clone();

    let resolution = gate.resolve(original, &ApprovalSession::new()).await;

    assert_eq!(resolution.status, ApprovalStatus::Modified);
    assert_eq!(resolution.message, "modified by user");
    let edited = resolution.action.unwrap();
    assert_eq!(edited.changed_keys(&before), vec!["title", "priority"]);
    assert_eq!(edited.get("title"), Some(&ParamValue::Text("Add fuzzy search".into())));
    assert_eq!(edited.get("priority"), Some(&ParamValue::from(1i64)));
    assert_eq!(edited.get("labels"), before.get("labels"));
    assert_eq!(edited.keys().collect::<Vec<_>>(), vec!["title", "labels", "priority"]);

    assert_eq!(approver.notices().len(), 2);
    assert_eq!(ledger.entries()[0].status, ApprovalStatus::Modified);
}

#[tokio::test]
async fn test_modify_cancel_returns_to_main_prompt() {
    let (gate, approver, _) = gate_with(
        policy(true, false),
        vec![
            ScriptStep::Choice(ApproverChoice::Modify),
            ScriptStep::edit("title=Discarded"),
            ScriptStep::edit("cancel"),
            approve(),
        ],
    );
    let original = issue_request(RiskLevel::Medium);
    let before = original.proposed_action().clone();

    let resolution = gate.resolve(original, &ApprovalSession::new()).await;

    assert_eq!(resolution.status, ApprovalStatus::Approved);
    assert_eq!(resolution.action, Some(before));
    assert!(approver.notices().contains(&"Modifications cancelled".to_string()));
    // Presented once, asked twice
    assert_eq!(approver.presented().len(), 1);
}

#[tokio::test]
async fn test_malformed_edit_is_reported_and_reprompted() {
    let (gate, approver, _) = gate_with(
        policy(true, false),
        vec![
            ScriptStep::Choice(ApproverChoice::Modify),
            ScriptStep::edit("no separator here"),
            ScriptStep::edit("=value"),
            ScriptStep::edit("assignee=\"octocat\""),
            ScriptStep::edit("DONE"),
        ],
    );

    let resolution = gate
        .resolve(issue_request(RiskLevel::Medium), &ApprovalSession::new())
        .await;

    assert_eq!(resolution.status, ApprovalStatus::Modified);
    let action = resolution.action.unwrap();
    assert_eq!(action.get("assignee").and_then(|v| v.as_str()), Some("octocat"));
    let notices = approver.notices();
    assert!(notices[0].starts_with("Invalid format"));
    assert!(notices[1].contains("cannot be empty"));
}

#[tokio::test]
async fn test_info_does_not_resolve() {
    let (gate, approver, _) = gate_with(
        policy(true, false),
        vec![ScriptStep::Choice(ApproverChoice::Info), approve()],
    );
    let resolution = gate
        .resolve(issue_request(RiskLevel::High), &ApprovalSession::new())
        .await;

    assert_eq!(resolution.status, ApprovalStatus::Approved);
    assert_eq!(
        approver.events(),
        vec![
            "present:create_issue",
            "choose:create_issue",
            "info:create_issue",
            "choose:create_issue",
        ]
    );
}

#[tokio::test]
async fn test_resolution_carries_request_id() {
    let (gate, _, ledger) = gate_with(policy(true, false), vec![approve(), ScriptStep::reject("no")]);
    let session = ApprovalSession::new();

    let granted = issue_request(RiskLevel::High);
    let granted_id = granted.id;
    let resolution = gate.resolve(granted, &session).await;
    assert_eq!(resolution.request_id, granted_id);
    assert!(resolution.action.is_some());

    let refused = issue_request(RiskLevel::High);
    let refused_id = refused.id;
    let resolution = gate.resolve(refused, &session).await;
    assert_eq!(resolution.request_id, refused_id);
    assert!(resolution.action.is_none());

    let ids: Vec<_> = ledger.entries().iter().map(|e| e.request_id).collect();
    assert_eq!(ids, vec![granted_id, refused_id]);
}

// ── Session override ──

#[tokio::test]
async fn test_skip_auto_approves_later_critical_request() {
    let (gate, approver, ledger) = gate_with(
        policy(true, false),
        vec![ScriptStep::Choice(ApproverChoice::Skip)],
    );
    let session = ApprovalSession::new();

    let first = gate.resolve(issue_request(RiskLevel::Medium), &session).await;
    assert_eq!(first.status, ApprovalStatus::Approved);
    assert_eq!(first.message, "auto-approved (user skipped)");
    assert!(session.is_overridden());

    let critical = gate.resolve(issue_request(RiskLevel::Critical), &session.clone()).await;
    assert_eq!(critical.status, ApprovalStatus::Approved);
    assert_eq!(critical.message, "auto-approved (session override)");

    assert_eq!(approver.presented().len(), 1);
    assert_eq!(ledger.summary().count(ApprovalStatus::Approved), 2);
}

#[tokio::test]
async fn test_override_is_per_session() {
    let (gate, _, _) = gate_with(
        policy(true, false),
        vec![ScriptStep::Choice(ApproverChoice::Skip)],
    );
    gate.resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;

    // A fresh session still prompts; the script is exhausted, so it fails closed
    let other = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(other.status, ApprovalStatus::Rejected);
}

// ── Timeout ──

#[tokio::test]
async fn test_expired_request_times_out_without_prompting() {
    let (gate, approver, ledger) = gate_with(policy(true, false), vec![approve()]);
    let request = issue_request(RiskLevel::Medium)
        .with_timeout(Duration::from_secs(60))
        .with_created_at(chrono::Utc::now() - chrono::Duration::seconds(61));

    let resolution = gate.resolve(request, &ApprovalSession::new()).await;

    assert_eq!(resolution.status, ApprovalStatus::Timeout);
    assert_eq!(resolution.message, TIMEOUT_MESSAGE);
    assert!(resolution.action.is_none());
    assert!(approver.events().is_empty());
    assert_eq!(approver.remaining(), 1);
    assert_eq!(ledger.entries()[0].status, ApprovalStatus::Timeout);
}

#[tokio::test]
async fn test_unanswered_prompt_times_out() {
    let (gate, approver, ledger) = gate_with(policy(true, false), vec![ScriptStep::Stall]);
    let request = issue_request(RiskLevel::High).with_timeout(Duration::from_millis(200));

    let resolution = gate.resolve(request, &ApprovalSession::new()).await;

    assert_eq!(resolution.status, ApprovalStatus::Timeout);
    assert_eq!(approver.presented().len(), 1);
    assert!(ledger.pending().is_empty());
}

// ── Failures ──

#[tokio::test]
async fn test_interrupt_rejects() {
    let (gate, _, _) = gate_with(policy(true, false), vec![ScriptStep::Interrupt]);
    let resolution = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(resolution.status, ApprovalStatus::Rejected);
    assert_eq!(resolution.message, "interrupted by user");
}

#[tokio::test]
async fn test_interrupt_inside_modify_rejects() {
    let (gate, _, _) = gate_with(
        policy(true, false),
        vec![ScriptStep::Choice(ApproverChoice::Modify), ScriptStep::Interrupt],
    );
    let resolution = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(resolution.status, ApprovalStatus::Rejected);
    assert!(resolution.action.is_none());
}

#[tokio::test]
async fn test_closed_approver_fails_closed() {
    let (gate, _, ledger) = gate_with(policy(true, false), vec![]);
    let resolution = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(resolution.status, ApprovalStatus::Rejected);
    assert!(resolution.message.starts_with("approver unavailable"));
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn test_dropped_resolution_records_cancellation() {
    let (gate, _, ledger) = gate_with(policy(true, false), vec![ScriptStep::Stall]);
    let session = ApprovalSession::new();

    let result = tokio::time::timeout(
        Duration::from_millis(100),
        gate.resolve(issue_request(RiskLevel::High), &session),
    )
    .await;
    assert!(result.is_err());

    assert!(ledger.pending().is_empty());
    let entries = ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ApprovalStatus::Rejected);
    assert_eq!(entries[0].message, CANCELLED_MESSAGE);
}

// ── Concurrency ──

#[tokio::test]
async fn test_concurrent_requests_do_not_interleave() {
    let approver = Arc::new(
        ScriptedApprover::new(vec![
            ScriptStep::Choice(ApproverChoice::Info),
            approve(),
            ScriptStep::Choice(ApproverChoice::Info),
            approve(),
        ])
        .with_latency(Duration::from_millis(20)),
    );
    let ledger = Arc::new(InteractionLedger::new());
    let gate = Arc::new(ApprovalGate::new(policy(true, false), ledger.clone(), approver.clone()));
    let session = ApprovalSession::new();

    let spawn = |action: &str| {
        let gate = gate.clone();
        let session = session.clone();
        let request = ApprovalRequest::new(action, "", ActionParams::new(), RiskLevel::High);
        tokio::spawn(async move { gate.resolve(request, &session).await })
    };
    let a = spawn("first");
    let b = spawn("second");
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a.status, ApprovalStatus::Approved);
    assert_eq!(b.status, ApprovalStatus::Approved);

    // Whichever request got the turn first, its events form one contiguous block
    let events = approver.events();
    assert_eq!(events.len(), 8);
    let first_action = events[0].trim_start_matches("present:").to_string();
    assert!(events[..4].iter().all(|e| e.ends_with(&first_action)));
    assert!(events[4..].iter().all(|e| !e.ends_with(&first_action)));
    assert!(ledger.pending().is_empty());
}

#[tokio::test]
async fn test_waiting_requests_are_visible_as_pending() {
    let approver = Arc::new(
        ScriptedApprover::new(vec![approve(), approve()]).with_latency(Duration::from_millis(150)),
    );
    let ledger = Arc::new(InteractionLedger::new());
    let gate = Arc::new(ApprovalGate::new(policy(true, false), ledger.clone(), approver));
    let session = ApprovalSession::new();

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|action| {
            let gate = gate.clone();
            let session = session.clone();
            let request = ApprovalRequest::new(action, "", ActionParams::new(), RiskLevel::High);
            tokio::spawn(async move { gate.resolve(request, &session).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ledger.summary().pending, 2);

    for handle in handles {
        handle.await.unwrap();
    }
    let summary = ledger.summary();
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.total, 2);
}

// ── Ledger ──

#[tokio::test]
async fn test_summary_counts_every_resolution() {
    let (gate, _, ledger) = gate_with(
        policy(true, false),
        vec![
            approve(),
            ScriptStep::reject("no"),
            ScriptStep::Choice(ApproverChoice::Modify),
            ScriptStep::edit("done"),
        ],
    );
    let session = ApprovalSession::new();
    for _ in 0..4 {
        gate.resolve(issue_request(RiskLevel::Medium), &session).await;
    }

    let summary = ledger.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.status_breakdown.values().sum::<usize>(), 4);
    assert_eq!(summary.count(ApprovalStatus::Approved), 1);
    assert_eq!(summary.count(ApprovalStatus::Rejected), 2);
    assert_eq!(summary.count(ApprovalStatus::Modified), 1);
    assert_eq!(summary.risk_breakdown.get(&RiskLevel::Medium), Some(&4));
}

#[tokio::test]
async fn test_reloaded_policy_applies_to_next_request() {
    let (gate, approver, _) = gate_with(policy(true, false), vec![]);
    gate.reload_policy(policy(false, true));
    assert!(!gate.policy().human_approval_required);

    let resolution = gate
        .resolve(issue_request(RiskLevel::Low), &ApprovalSession::new())
        .await;
    assert_eq!(resolution.message, "auto-approved (low risk)");
    assert!(approver.events().is_empty());
}
