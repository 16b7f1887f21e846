//! Workflow requests, states, failures and reports.

use crate::approval::{ApprovalStatus, ContextMap};
use crate::capability::CapabilityOutput;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Planning,
    Standup,
    Monitoring,
    Webhook,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::Planning => write!(f, "planning"),
            WorkflowKind::Standup => write!(f, "standup"),
            WorkflowKind::Monitoring => write!(f, "monitoring"),
            WorkflowKind::Webhook => write!(f, "webhook"),
        }
    }
}

/// One workflow to run.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowRequest {
    Planning { brief: String },
    Standup,
    Monitoring,
    Webhook { event_type: String, payload: Value },
}

impl WorkflowRequest {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            WorkflowRequest::Planning { .. } => WorkflowKind::Planning,
            WorkflowRequest::Standup => WorkflowKind::Standup,
            WorkflowRequest::Monitoring => WorkflowKind::Monitoring,
            WorkflowRequest::Webhook { .. } => WorkflowKind::Webhook,
        }
    }

    /// Action type of the approval request this workflow creates.
    pub fn action_type(&self) -> String {
        match self {
            WorkflowRequest::Planning { .. } => "project_planning".to_string(),
            WorkflowRequest::Standup => "daily_standup".to_string(),
            WorkflowRequest::Monitoring => "monitoring_check".to_string(),
            WorkflowRequest::Webhook { event_type, .. } => format!("webhook_{}", event_type),
        }
    }
}

/// Per-invocation state machine:
/// `Requested → Gating → {Executing → Completed | Failed} | Blocked`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Requested,
    Gating,
    Executing,
    Completed,
    Failed,
    Blocked,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Blocked
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Requested => "requested",
            WorkflowState::Gating => "gating",
            WorkflowState::Executing => "executing",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

/// Where a workflow was when it got cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Gating,
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Gating => write!(f, "gating"),
            Phase::Executing => write!(f, "executing"),
        }
    }
}

/// Why a workflow did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    /// The gate resolved REJECTED or TIMEOUT.
    #[error("blocked ({status}): {message}")]
    PolicyBlocked {
        status: ApprovalStatus,
        message: String,
    },

    #[error("{agent} failed: {message}")]
    CapabilityFailure { agent: String, message: String },

    #[error("cancelled while {phase}")]
    Cancelled { phase: Phase },

    /// The workflow task panicked or was aborted.
    #[error("aborted: {detail}")]
    Aborted { detail: String },
}

/// Outcome of one workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow: WorkflowKind,
    pub action_type: String,
    pub state: WorkflowState,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CapabilityOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowReport {
    pub fn requested(workflow: WorkflowKind, action_type: impl Into<String>) -> Self {
        Self {
            workflow,
            action_type: action_type.into(),
            state: WorkflowState::Requested,
            success: false,
            request_id: None,
            approval_status: None,
            approval_message: None,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Report for a workflow task that never returned one.
    pub fn aborted(workflow: WorkflowKind, action_type: impl Into<String>, detail: String) -> Self {
        Self::requested(workflow, action_type).fail(WorkflowError::Aborted { detail })
    }

    pub(crate) fn enter(&mut self, state: WorkflowState) {
        tracing::info!(workflow = %self.workflow, action = %self.action_type, "{} → {}", self.state, state);
        self.state = state;
    }

    pub(crate) fn complete(mut self, output: CapabilityOutput) -> Self {
        self.enter(WorkflowState::Completed);
        self.success = true;
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
        self
    }

    pub(crate) fn fail(mut self, error: WorkflowError) -> Self {
        let state = match error {
            WorkflowError::PolicyBlocked { .. } => WorkflowState::Blocked,
            _ => WorkflowState::Failed,
        };
        self.enter(state);
        self.success = false;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        self
    }

    /// Failure text, or the capability's response on success.
    pub fn detail(&self) -> String {
        match (&self.error, &self.output) {
            (Some(error), _) => error.to_string(),
            (None, Some(output)) => output.response.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Outcome of a batch of workflows, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub overall_success: bool,
    pub workflows: Vec<WorkflowReport>,
    pub project_context: ContextMap,
}

impl BatchReport {
    pub fn new(workflows: Vec<WorkflowReport>, project_context: ContextMap) -> Self {
        Self {
            overall_success: workflows.iter().all(|w| w.success),
            workflows,
            project_context,
        }
    }

    /// First report of the given kind.
    pub fn get(&self, kind: WorkflowKind) -> Option<&WorkflowReport> {
        self.workflows.iter().find(|w| w.workflow == kind)
    }
}
