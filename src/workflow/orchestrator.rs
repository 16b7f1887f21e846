//! Workflow orchestrator — composes gate → capability steps into workflows.
//!
//! Every workflow runs as its own tokio task with a cancellation token that
//! is a child of the orchestrator's shutdown token. A failing, cancelled or
//! panicking workflow never stops the rest of a batch.

use crate::approval::{
    Approver, ApprovalGate, ApprovalRequest, ApprovalSession, ActionParams, ContextMap,
    Resolution,
};
use crate::capability::{CapabilityKind, CapabilitySet};
use crate::config::{OrchestratorSettings, ProjectSettings, Settings};
use crate::ledger::{InteractionLedger, LedgerSummary, PendingRequest};
use crate::risk::{RiskClassifier, RiskLevel};
use crate::workflow::types::{
    BatchReport, Phase, WorkflowError, WorkflowKind, WorkflowReport, WorkflowRequest,
    WorkflowState,
};
use crate::workflow::webhook;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How the workflows of a batch are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Each workflow finishes before the next one starts
    #[default]
    Sequential,
    /// All workflows start at once; interactive approval is still one at a time
    Concurrent,
}

impl ExecutionMode {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        if settings.concurrent {
            ExecutionMode::Concurrent
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// One gated step, ready to run.
struct Step {
    workflow: WorkflowKind,
    action_type: String,
    description: String,
    params: ActionParams,
    base_risk: RiskLevel,
    /// Run the classifier over `params`; only for free-form input
    reclassify: bool,
    context: ContextMap,
    capability: CapabilityKind,
    /// Webhook event type, used to word the capability task
    event_type: Option<String>,
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct CrewStatus {
    pub project_context: ContextMap,
    pub agents: BTreeMap<CapabilityKind, String>,
    pub configuration: CrewConfiguration,
    pub session: SessionStatus,
    pub pending: usize,
    pub interactions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrewConfiguration {
    pub human_approval_required: bool,
    pub auto_approve_low_risk: bool,
    pub approval_timeout_secs: u64,
    pub ci_enabled: bool,
    pub execution_mode: ExecutionMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub override_active: bool,
}

struct Inner {
    gate: ApprovalGate,
    session: ApprovalSession,
    capabilities: CapabilitySet,
    classifier: RwLock<Arc<RiskClassifier>>,
    project: RwLock<ProjectSettings>,
    mode: RwLock<ExecutionMode>,
    shutdown: CancellationToken,
}

/// Runs named workflows against one approver. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl WorkflowOrchestrator {
    pub fn new(
        settings: &Settings,
        approver: Arc<dyn Approver>,
        ledger: Arc<InteractionLedger>,
        capabilities: CapabilitySet,
    ) -> Result<Self> {
        Self::with_session(settings, approver, ledger, capabilities, ApprovalSession::new())
    }

    /// Like `new`, with a session created by the caller (the CLI names the
    /// ledger journal after it).
    pub fn with_session(
        settings: &Settings,
        approver: Arc<dyn Approver>,
        ledger: Arc<InteractionLedger>,
        capabilities: CapabilitySet,
        session: ApprovalSession,
    ) -> Result<Self> {
        let classifier =
            RiskClassifier::new(&settings.risk).context("Invalid glob pattern in risk rules")?;
        let gate = ApprovalGate::new(settings.approval.policy(), ledger, approver)
            .with_details(settings.project.details());

        tracing::info!(
            project = %settings.project.name,
            repository = %settings.project.repository_or_unknown(),
            "Crew initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                gate,
                session,
                capabilities,
                classifier: RwLock::new(Arc::new(classifier)),
                project: RwLock::new(settings.project.clone()),
                mode: RwLock::new(ExecutionMode::from_settings(&settings.orchestrator)),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.inner.gate
    }

    pub fn session(&self) -> &ApprovalSession {
        &self.inner.session
    }

    pub fn ledger(&self) -> &Arc<InteractionLedger> {
        self.inner.gate.ledger()
    }

    pub fn summary(&self) -> LedgerSummary {
        self.ledger().summary()
    }

    pub fn pending(&self) -> Vec<PendingRequest> {
        self.ledger().pending()
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        *self.inner.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn project(&self) -> ProjectSettings {
        self.inner
            .project
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn classifier(&self) -> Arc<RiskClassifier> {
        self.inner
            .classifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel every running workflow.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down running workflows");
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Apply new settings: approval policy, risk rules, project context and
    /// execution mode. Also resets the session override.
    pub fn reload(&self, settings: &Settings) -> Result<()> {
        let classifier =
            RiskClassifier::new(&settings.risk).context("Invalid glob pattern in risk rules")?;

        self.inner.gate.reload_policy(settings.approval.policy());
        self.inner.gate.set_details(settings.project.details());
        *self
            .inner
            .classifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(classifier);
        *self
            .inner
            .project
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings.project.clone();
        *self.inner.mode.write().unwrap_or_else(PoisonError::into_inner) =
            ExecutionMode::from_settings(&settings.orchestrator);
        self.inner.session.reset();

        tracing::info!("Configuration reloaded");
        Ok(())
    }

    pub fn status(&self) -> CrewStatus {
        let project = self.project();
        let policy = self.inner.gate.policy();
        let summary = self.summary();

        CrewStatus {
            project_context: project.context(),
            agents: self.inner.capabilities.names(),
            configuration: CrewConfiguration {
                human_approval_required: policy.human_approval_required,
                auto_approve_low_risk: policy.auto_approve_low_risk,
                approval_timeout_secs: policy.timeout.as_secs(),
                ci_enabled: project.ci_enabled,
                execution_mode: self.execution_mode(),
            },
            session: SessionStatus {
                id: self.inner.session.id(),
                override_active: self.inner.session.is_overridden(),
            },
            pending: summary.pending,
            interactions: summary.total,
        }
    }

    pub async fn run_planning(&self, brief: &str) -> WorkflowReport {
        self.spawn(WorkflowRequest::Planning {
            brief: brief.to_string(),
        })
        .await
    }

    pub async fn run_standup(&self) -> WorkflowReport {
        self.spawn(WorkflowRequest::Standup).await
    }

    pub async fn run_monitoring(&self) -> WorkflowReport {
        self.spawn(WorkflowRequest::Monitoring).await
    }

    pub async fn handle_webhook(&self, event_type: &str, payload: serde_json::Value) -> WorkflowReport {
        self.spawn(WorkflowRequest::Webhook {
            event_type: event_type.to_string(),
            payload,
        })
        .await
    }

    /// Planning (only when a brief is given), then standup and monitoring.
    pub async fn run_full(&self, brief: Option<&str>) -> BatchReport {
        let mut requests = Vec::with_capacity(3);
        if let Some(brief) = brief.filter(|b| !b.trim().is_empty()) {
            requests.push(WorkflowRequest::Planning {
                brief: brief.to_string(),
            });
        }
        requests.push(WorkflowRequest::Standup);
        requests.push(WorkflowRequest::Monitoring);
        self.run_batch(requests).await
    }

    /// Run independent workflows under the configured execution mode.
    /// Reports come back in request order.
    pub async fn run_batch(&self, requests: Vec<WorkflowRequest>) -> BatchReport {
        let reports = match self.execution_mode() {
            ExecutionMode::Sequential => {
                let mut reports = Vec::with_capacity(requests.len());
                for request in requests {
                    reports.push(self.spawn(request).await);
                }
                reports
            }
            ExecutionMode::Concurrent => {
                join_all(requests.into_iter().map(|request| self.spawn(request))).await
            }
        };

        let batch = BatchReport::new(reports, self.project().context());
        tracing::info!(
            overall_success = batch.overall_success,
            workflows = batch.workflows.len(),
            "Batch finished"
        );
        batch
    }

    /// Run one workflow as its own task, tied to the shutdown token.
    async fn spawn(&self, request: WorkflowRequest) -> WorkflowReport {
        let kind = request.kind();
        let action_type = request.action_type();
        let token = self.inner.shutdown.child_token();

        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(request, token).await });

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                let detail = if e.is_panic() {
                    "workflow task panicked".to_string()
                } else {
                    format!("workflow task ended unexpectedly: {}", e)
                };
                tracing::warn!(workflow = %kind, "{}", detail);
                WorkflowReport::aborted(kind, action_type, detail)
            }
        }
    }

    /// Run one workflow on the current task.
    pub async fn run(&self, request: WorkflowRequest, cancel: CancellationToken) -> WorkflowReport {
        let step = self.prepare(request);
        self.execute(step, cancel).await
    }

    fn prepare(&self, request: WorkflowRequest) -> Step {
        let project = self.project();
        let action_type = request.action_type();

        match request {
            WorkflowRequest::Planning { brief } => Step {
                workflow: WorkflowKind::Planning,
                action_type,
                description: format!("Plan and break down project: {}", abbreviate(&brief, 100)),
                params: ActionParams::new()
                    .with("project_brief", brief)
                    .with("target_repository", project.repository_or_unknown())
                    .with("team_members", project.team_members.clone()),
                base_risk: RiskLevel::Low,
                reclassify: true,
                context: project.context(),
                capability: CapabilityKind::Planning,
                event_type: None,
            },
            WorkflowRequest::Standup => Step {
                workflow: WorkflowKind::Standup,
                action_type,
                description: "Generate and post daily standup report to team".to_string(),
                params: ActionParams::new()
                    .with("target_channel", project.channel.as_str())
                    .with("repository", project.repository_or_unknown())
                    .with("include_project_board", project.board_id.is_some()),
                base_risk: RiskLevel::Low,
                reclassify: false,
                context: project.context(),
                capability: CapabilityKind::Reporting,
                event_type: None,
            },
            WorkflowRequest::Monitoring => Step {
                workflow: WorkflowKind::Monitoring,
                action_type,
                description: "Scan repository for risks, issues, and CI/CD status".to_string(),
                params: ActionParams::new()
                    .with("repository", project.repository_or_unknown())
                    .with("check_workflows", project.ci_enabled)
                    .with("check_critical_issues", true)
                    .with("generate_alerts", true),
                base_risk: RiskLevel::Low,
                reclassify: false,
                context: project.context(),
                capability: CapabilityKind::Monitoring,
                event_type: None,
            },
            WorkflowRequest::Webhook { event_type, payload } => Step {
                workflow: WorkflowKind::Webhook,
                action_type,
                description: format!("Process webhook event: {}", event_type),
                params: webhook::webhook_action(&event_type, &payload),
                base_risk: RiskLevel::Medium,
                reclassify: true,
                context: webhook::webhook_context(project.context(), &payload),
                capability: webhook::route(&event_type),
                event_type: Some(event_type),
            },
        }
    }

    async fn execute(&self, step: Step, cancel: CancellationToken) -> WorkflowReport {
        let mut report = WorkflowReport::requested(step.workflow, &step.action_type);

        if cancel.is_cancelled() {
            return report.fail(WorkflowError::Cancelled {
                phase: Phase::Gating,
            });
        }

        let risk = if step.reclassify {
            self.classifier()
                .classify_at_least(&step.action_type, &step.params, step.base_risk)
        } else {
            step.base_risk
        };
        let request = ApprovalRequest::new(
            &step.action_type,
            &step.description,
            step.params.clone(),
            risk,
        )
        .with_context(step.context.clone())
        .with_timeout(self.inner.gate.policy().timeout);
        report.request_id = Some(request.id);

        report.enter(WorkflowState::Gating);
        let resolution = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(workflow = %step.workflow, "Cancelled while awaiting approval");
                return report.fail(WorkflowError::Cancelled { phase: Phase::Gating });
            }
            resolution = self.inner.gate.resolve(request, &self.inner.session) => resolution,
        };

        let Resolution {
            status,
            action,
            message,
            ..
        } = resolution;
        report.approval_status = Some(status);
        report.approval_message = Some(message.clone());

        let action = match action {
            Some(action) if status.is_granted() => action,
            _ => return report.fail(WorkflowError::PolicyBlocked { status, message }),
        };

        report.enter(WorkflowState::Executing);
        let task = render_task(&step, &action);
        let mut context = step.context;
        context.insert("approved_action".to_string(), action.to_json());

        let capability = self.inner.capabilities.get(step.capability);
        tracing::debug!(workflow = %step.workflow, agent = %capability.name(), "Invoking capability");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(workflow = %step.workflow, "Cancelled while executing");
                return report.fail(WorkflowError::Cancelled { phase: Phase::Executing });
            }
            outcome = capability.invoke(&task, &context) => outcome,
        };

        match outcome {
            Ok(output) => report.complete(output),
            Err(e) => report.fail(WorkflowError::CapabilityFailure {
                agent: e.agent,
                message: e.message,
            }),
        }
    }
}

/// Task text for the capability, built from the resolved action so that
/// edits made during approval are what gets executed.
fn render_task(step: &Step, action: &ActionParams) -> String {
    let text = |key: &str| {
        action
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_default()
    };

    let headline = match (step.workflow, step.capability) {
        (WorkflowKind::Planning, _) => {
            format!("Plan and break down project: {}", text("project_brief"))
        }
        (WorkflowKind::Standup, _) => {
            format!("Generate daily standup report for {}", text("target_channel"))
        }
        (WorkflowKind::Monitoring, _) => {
            format!("Perform health check for {}", text("repository"))
        }
        (WorkflowKind::Webhook, CapabilityKind::Planning) => format!(
            "Handle {} event ({}) for {}",
            step.event_type.as_deref().unwrap_or_default(),
            text("action"),
            text("repository")
        ),
        (WorkflowKind::Webhook, CapabilityKind::Monitoring) => {
            format!("Perform health check for {}", text("repository"))
        }
        (WorkflowKind::Webhook, CapabilityKind::Reporting) => format!(
            "Generate status report for {} event on {}",
            step.event_type.as_deref().unwrap_or_default(),
            text("repository")
        ),
    };

    format!("{}\n\nApproved parameters:\n{}", headline, action.to_lines())
}

fn abbreviate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(workflow: WorkflowKind, capability: CapabilityKind, event: Option<&str>) -> Step {
        Step {
            workflow,
            action_type: "x".to_string(),
            description: String::new(),
            params: ActionParams::new(),
            base_risk: RiskLevel::Low,
            reclassify: false,
            context: ContextMap::new(),
            capability,
            event_type: event.map(str::to_string),
        }
    }

    #[test]
    fn test_task_uses_resolved_brief() {
        let action = ActionParams::new().with("project_brief", "Edited brief");
        let task = render_task(
            &step(WorkflowKind::Planning, CapabilityKind::Planning, None),
            &action,
        );
        assert!(task.starts_with("Plan and break down project: Edited brief\n"));
        assert!(task.contains("project_brief: Edited brief"));
    }

    #[test]
    fn test_webhook_task_follows_route() {
        let action = webhook::webhook_action(
            "check_run",
            &serde_json::json!({ "repository": { "full_name": "acme/widgets" } }),
        );
        let task = render_task(
            &step(WorkflowKind::Webhook, CapabilityKind::Monitoring, Some("check_run")),
            &action,
        );
        assert!(task.starts_with("Perform health check for acme/widgets"));
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10), "short");
        assert_eq!(abbreviate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_execution_mode_from_settings() {
        assert_eq!(
            ExecutionMode::from_settings(&OrchestratorSettings { concurrent: true }),
            ExecutionMode::Concurrent
        );
        assert_eq!(
            ExecutionMode::from_settings(&OrchestratorSettings::default()),
            ExecutionMode::Sequential
        );
    }
}
