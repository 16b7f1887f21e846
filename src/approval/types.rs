//! Types for the approval flow.

use crate::approval::params::ActionParams;
use crate::risk::{RiskClassifier, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Read-only context shown to the approver. Never executed.
pub type ContextMap = Map<String, Value>;

/// Default time a request may wait for a human (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle status of an approval request.
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Timeout,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Approved or Modified: the action may run.
    pub fn is_granted(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Modified)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::Modified => write!(f, "modified"),
            ApprovalStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Policy switches that decide when the gate may skip the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub human_approval_required: bool,
    pub auto_approve_low_risk: bool,
    pub timeout: Duration,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            human_approval_required: true,
            auto_approve_low_risk: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One gated action waiting for a decision.
///
/// Status moves out of `Pending` exactly once. The proposed action can only be
/// swapped as a whole, and only while pending.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub action_type: String,
    pub description: String,
    proposed_action: ActionParams,
    pub risk_level: RiskLevel,
    pub context: ContextMap,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    status: ApprovalStatus,
}

impl ApprovalRequest {
    pub fn new(
        action_type: impl Into<String>,
        description: impl Into<String>,
        proposed_action: ActionParams,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: action_type.into(),
            description: description.into(),
            proposed_action,
            risk_level,
            context: ContextMap::new(),
            timeout: DEFAULT_TIMEOUT,
            created_at: Utc::now(),
            status: ApprovalStatus::Pending,
        }
    }

    /// A request for an external action whose risk is decided by the classifier.
    pub fn classified(
        action_name: &str,
        params: ActionParams,
        context: ContextMap,
        classifier: &RiskClassifier,
    ) -> Self {
        let risk = classifier.classify(action_name, &params, RiskLevel::Low);
        Self::new(
            action_name,
            format!("Execute action: {}", action_name),
            params,
            risk,
        )
        .with_context(context)
    }

    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the creation time (used to replay or backdate a request).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn proposed_action(&self) -> &ActionParams {
        &self.proposed_action
    }

    /// Move to a terminal status. Returns false (and changes nothing) if the
    /// request is already terminal or `status` is `Pending`.
    pub fn transition(&mut self, status: ApprovalStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Replace the whole proposed action. Only allowed while pending.
    pub fn replace_action(&mut self, action: ActionParams) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.proposed_action = action;
        true
    }

    /// Time left before the request expires, or `None` once
    /// `now - created_at >= timeout`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let elapsed = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        self.timeout
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now).is_none()
    }

    pub(crate) fn into_action(self) -> ActionParams {
        self.proposed_action
    }
}

/// The outcome of running a request through the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub request_id: Uuid,
    pub status: ApprovalStatus,
    /// The action to execute: original for Approved, edited for Modified,
    /// `None` for Rejected and Timeout.
    pub action: Option<ActionParams>,
    pub message: String,
}

impl Resolution {
    pub fn is_granted(&self) -> bool {
        self.status.is_granted()
    }
}

/// What the approver answered at the main prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproverChoice {
    Approve,
    Reject { reason: Option<String> },
    Modify,
    Info,
    /// Approve this one and every later request in the session.
    Skip,
}

impl ApproverChoice {
    /// Parse a single-letter (or full word) answer from the prompt.
    pub fn from_str_loose(s: &str) -> Option<ApproverChoice> {
        match s.to_lowercase().trim() {
            "" | "a" | "approve" | "y" | "yes" => Some(ApproverChoice::Approve),
            "r" | "reject" | "n" | "no" => Some(ApproverChoice::Reject { reason: None }),
            "m" | "modify" | "edit" => Some(ApproverChoice::Modify),
            "i" | "info" => Some(ApproverChoice::Info),
            "s" | "skip" => Some(ApproverChoice::Skip),
            _ => None,
        }
    }
}

/// Everything the approver sees for one request.
#[derive(Debug, Clone, Copy)]
pub struct Presentation<'a> {
    pub request: &'a ApprovalRequest,
    pub timeout_remaining: Duration,
    /// Extra `label: value` rows from the gate (project, sprint, ...).
    pub details: &'a [(String, String)],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(
            "create_issue",
            "Create an issue",
            ActionParams::new().with("title", "Bug"),
            RiskLevel::Low,
        )
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut req = request();
        assert_eq!(req.status(), ApprovalStatus::Pending);
        assert!(!req.transition(ApprovalStatus::Pending));

        assert!(req.transition(ApprovalStatus::Rejected));
        for next in [
            ApprovalStatus::Approved,
            ApprovalStatus::Modified,
            ApprovalStatus::Timeout,
            ApprovalStatus::Rejected,
        ] {
            assert!(!req.transition(next));
            assert_eq!(req.status(), ApprovalStatus::Rejected);
        }
    }

    #[test]
    fn test_action_replaced_only_while_pending() {
        let mut req = request();
        assert!(req.replace_action(ActionParams::new().with("title", "Edited")));
        assert!(req.transition(ApprovalStatus::Modified));
        assert!(!req.replace_action(ActionParams::new()));
        assert_eq!(
            req.proposed_action().get("title").and_then(|v| v.as_str()),
            Some("Edited")
        );
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let created = Utc::now();
        let req = request()
            .with_created_at(created)
            .with_timeout(Duration::from_secs(10));

        assert!(!req.is_expired_at(created + chrono::Duration::seconds(9)));
        assert!(req.is_expired_at(created + chrono::Duration::seconds(10)));
        assert!(req.is_expired_at(created + chrono::Duration::seconds(11)));
        assert_eq!(
            req.remaining_at(created + chrono::Duration::seconds(4)),
            Some(Duration::from_secs(6))
        );
    }

    #[test]
    fn test_zero_timeout_is_already_expired() {
        let req = request().with_timeout(Duration::ZERO);
        assert!(req.is_expired_at(req.created_at));
    }

    #[test]
    fn test_classified_request() {
        let classifier = RiskClassifier::default();
        let req = ApprovalRequest::classified(
            "trigger_workflow",
            ActionParams::new().with("workflow", "deploy.yml"),
            ContextMap::new(),
            &classifier,
        );
        assert_eq!(req.risk_level, RiskLevel::High);
        assert_eq!(req.description, "Execute action: trigger_workflow");
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!(ApproverChoice::from_str_loose("A"), Some(ApproverChoice::Approve));
        assert_eq!(ApproverChoice::from_str_loose(""), Some(ApproverChoice::Approve));
        assert_eq!(ApproverChoice::from_str_loose("s"), Some(ApproverChoice::Skip));
        assert_eq!(ApproverChoice::from_str_loose("x"), None);
    }
}
