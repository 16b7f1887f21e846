//! Approval gate — decides, per request, whether an action may run.
//!
//! Resolution order:
//! 1. auto-approval rules (low-risk rule first, then "approval not required")
//! 2. session override (the approver chose "skip" earlier in the session)
//! 3. interactive resolution, one request at a time, FIFO
//!
//! `resolve` never fails: approver errors, interrupts and cancellation all
//! end in REJECTED, an expired deadline ends in TIMEOUT. Every outcome is
//! recorded in the ledger exactly once.

use crate::approval::params::{parse_edit, ActionParams, EditCommand};
use crate::approval::session::ApprovalSession;
use crate::approval::types::{
    ApprovalPolicy, ApprovalRequest, ApprovalStatus, ApproverChoice, Presentation, Resolution,
};
use crate::approval::{Approver, ApproverError};
use crate::ledger::{InteractionLedger, LedgerEntry, PendingRequest};
use crate::risk::RiskLevel;
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const LOW_RISK_MESSAGE: &str = "auto-approved (low risk)";
pub const NOT_REQUIRED_MESSAGE: &str = "auto-approved (approval not required)";
pub const SESSION_OVERRIDE_MESSAGE: &str = "auto-approved (session override)";
pub const USER_SKIPPED_MESSAGE: &str = "auto-approved (user skipped)";
pub const APPROVED_MESSAGE: &str = "approved by user";
pub const MODIFIED_MESSAGE: &str = "modified by user";
pub const TIMEOUT_MESSAGE: &str = "request timed out";
pub const CANCELLED_MESSAGE: &str = "cancelled while awaiting approval";

/// Decide whether the policy lets a request through without a human.
///
/// Both bypasses are always considered, in this order:
/// 1. LOW risk, `auto_approve_low_risk`, and approval not required
/// 2. approval not required and risk below HIGH
pub fn auto_approval(policy: &ApprovalPolicy, risk: RiskLevel) -> Option<&'static str> {
    if risk == RiskLevel::Low && policy.auto_approve_low_risk && !policy.human_approval_required {
        return Some(LOW_RISK_MESSAGE);
    }
    if !policy.human_approval_required && !risk.is_elevated() {
        return Some(NOT_REQUIRED_MESSAGE);
    }
    None
}

/// Gate between agent-proposed actions and their execution.
pub struct ApprovalGate {
    policy: RwLock<ApprovalPolicy>,
    ledger: Arc<InteractionLedger>,
    approver: Arc<dyn Approver>,
    /// Held for the whole interactive phase of one request. tokio's mutex is
    /// fair, so waiting requests are presented in arrival order.
    turn: Mutex<()>,
    details: RwLock<Vec<(String, String)>>,
}

/// How the interactive phase ended.
struct Outcome {
    status: ApprovalStatus,
    edited: Option<ActionParams>,
    message: String,
}

impl Outcome {
    fn new(status: ApprovalStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            edited: None,
            message: message.into(),
        }
    }
}

/// Why the interactive phase stopped without a decision.
enum Halt {
    TimedOut,
    Failed(ApproverError),
}

impl From<Halt> for Outcome {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::TimedOut => Outcome::new(ApprovalStatus::Timeout, TIMEOUT_MESSAGE),
            Halt::Failed(ApproverError::Interrupted) => {
                Outcome::new(ApprovalStatus::Rejected, "interrupted by user")
            }
            Halt::Failed(e) => {
                Outcome::new(ApprovalStatus::Rejected, format!("approver unavailable: {}", e))
            }
        }
    }
}

/// Run an approver call, bounded by the time the request has left.
async fn bounded<T>(
    remaining: Duration,
    call: impl Future<Output = Result<T, ApproverError>>,
) -> Result<T, Halt> {
    match tokio::time::timeout(remaining, call).await {
        Err(_) => Err(Halt::TimedOut),
        Ok(Err(e)) => Err(Halt::Failed(e)),
        Ok(Ok(value)) => Ok(value),
    }
}

fn time_left(request: &ApprovalRequest) -> Result<Duration, Halt> {
    request.remaining_at(Utc::now()).ok_or(Halt::TimedOut)
}

/// Keeps a request in the pending set. If dropped while armed (the resolving
/// future was cancelled), the request is recorded as REJECTED.
struct PendingGuard<'a> {
    ledger: &'a InteractionLedger,
    request_id: Uuid,
    on_cancel: Option<LedgerEntry>,
}

impl<'a> PendingGuard<'a> {
    fn register(ledger: &'a InteractionLedger, request: &ApprovalRequest) -> Self {
        ledger.register_pending(PendingRequest::from(request));
        Self {
            ledger,
            request_id: request.id,
            on_cancel: Some(LedgerEntry::for_request(
                request,
                ApprovalStatus::Rejected,
                CANCELLED_MESSAGE,
            )),
        }
    }

    fn disarm(&mut self) {
        self.on_cancel = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.on_cancel.take() {
            tracing::warn!(
                request = %self.request_id,
                action = %entry.action_type,
                "Approval cancelled while pending, recording as rejected"
            );
            entry.timestamp = Utc::now();
            self.ledger.complete(self.request_id, entry);
        }
    }
}

impl ApprovalGate {
    pub fn new(
        policy: ApprovalPolicy,
        ledger: Arc<InteractionLedger>,
        approver: Arc<dyn Approver>,
    ) -> Self {
        Self {
            policy: RwLock::new(policy),
            ledger,
            approver,
            turn: Mutex::new(()),
            details: RwLock::new(Vec::new()),
        }
    }

    /// Extra rows shown by the "info" choice (project, sprint, ...).
    pub fn with_details(self, details: Vec<(String, String)>) -> Self {
        self.set_details(details);
        self
    }

    pub fn set_details(&self, details: Vec<(String, String)>) {
        *self.details.write().unwrap_or_else(PoisonError::into_inner) = details;
    }

    pub fn details(&self) -> Vec<(String, String)> {
        self.details
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn policy(&self) -> ApprovalPolicy {
        *self.policy.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reload_policy(&self, policy: ApprovalPolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        tracing::info!(
            human_approval_required = policy.human_approval_required,
            auto_approve_low_risk = policy.auto_approve_low_risk,
            "Approval policy reloaded"
        );
    }

    pub fn ledger(&self) -> &Arc<InteractionLedger> {
        &self.ledger
    }

    /// Resolve a request. Blocks while waiting for the approver.
    pub async fn resolve(&self, request: ApprovalRequest, session: &ApprovalSession) -> Resolution {
        if let Some(message) = auto_approval(&self.policy(), request.risk_level) {
            return self.approve_without_prompt(request, message);
        }
        if session.is_overridden() {
            return self.approve_without_prompt(request, SESSION_OVERRIDE_MESSAGE);
        }

        let mut guard = PendingGuard::register(&self.ledger, &request);
        tracing::debug!(
            request = %request.id,
            action = %request.action_type,
            risk = %request.risk_level,
            "Awaiting approver"
        );

        let outcome = {
            let _turn = self.turn.lock().await;
            self.interact(&request, session).await
        };

        guard.disarm();
        self.conclude(request, outcome)
    }

    fn approve_without_prompt(&self, mut request: ApprovalRequest, message: &str) -> Resolution {
        request.transition(ApprovalStatus::Approved);
        self.ledger
            .record(LedgerEntry::for_request(&request, ApprovalStatus::Approved, message));
        tracing::info!(
            action = %request.action_type,
            risk = %request.risk_level,
            "{}",
            message
        );

        Resolution {
            request_id: request.id,
            status: ApprovalStatus::Approved,
            message: message.to_string(),
            action: Some(request.into_action()),
        }
    }

    fn conclude(&self, mut request: ApprovalRequest, outcome: Outcome) -> Resolution {
        if let Some(edited) = outcome.edited {
            request.replace_action(edited);
        }
        request.transition(outcome.status);

        let entry = LedgerEntry::for_request(&request, outcome.status, outcome.message.as_str());
        self.ledger.complete(request.id, entry);
        tracing::info!(
            action = %request.action_type,
            risk = %request.risk_level,
            status = %outcome.status,
            "{}",
            outcome.message
        );

        let request_id = request.id;
        let action = outcome.status.is_granted().then(|| request.into_action());
        Resolution {
            request_id,
            status: outcome.status,
            action,
            message: outcome.message,
        }
    }

    /// The interactive phase. Runs while holding the approver turn.
    async fn interact(&self, request: &ApprovalRequest, session: &ApprovalSession) -> Outcome {
        match self.choice_loop(request, session).await {
            Ok(outcome) => outcome,
            Err(halt) => halt.into(),
        }
    }

    async fn choice_loop(
        &self,
        request: &ApprovalRequest,
        session: &ApprovalSession,
    ) -> Result<Outcome, Halt> {
        let details = self.details();
        let mut presented = false;

        loop {
            let remaining = time_left(request)?;
            let view = Presentation {
                request,
                timeout_remaining: remaining,
                details: &details,
            };

            if !presented {
                bounded(remaining, self.approver.present(&view)).await?;
                presented = true;
            }

            match bounded(remaining, self.approver.choose(&view)).await? {
                ApproverChoice::Approve => {
                    return Ok(Outcome::new(ApprovalStatus::Approved, APPROVED_MESSAGE));
                }
                ApproverChoice::Reject { reason } => {
                    let message = match reason.as_deref().map(str::trim) {
                        Some(reason) if !reason.is_empty() => {
                            format!("rejected by user: {}", reason)
                        }
                        _ => "rejected by user".to_string(),
                    };
                    return Ok(Outcome::new(ApprovalStatus::Rejected, message));
                }
                ApproverChoice::Modify => match self.modify(request).await? {
                    Some(edited) => {
                        return Ok(Outcome {
                            status: ApprovalStatus::Modified,
                            edited: Some(edited),
                            message: MODIFIED_MESSAGE.to_string(),
                        });
                    }
                    None => self.approver.notify("Modifications cancelled").await,
                },
                ApproverChoice::Info => {
                    bounded(remaining, self.approver.show_info(&view)).await?;
                }
                ApproverChoice::Skip => {
                    session.skip_remaining();
                    self.approver
                        .notify("Auto-approving remaining actions for this session")
                        .await;
                    return Ok(Outcome::new(ApprovalStatus::Approved, USER_SKIPPED_MESSAGE));
                }
            }
        }
    }

    /// The modify sub-loop. `Some` commits the working copy, `None` cancels.
    async fn modify(&self, request: &ApprovalRequest) -> Result<Option<ActionParams>, Halt> {
        let original = request.proposed_action();
        let mut working = original.clone();

        loop {
            let remaining = time_left(request)?;
            let line = bounded(remaining, self.approver.read_edit(original, &working)).await?;

            match parse_edit(&line) {
                Ok(EditCommand::Done) => return Ok(Some(working)),
                Ok(EditCommand::Cancel) => return Ok(None),
                Ok(EditCommand::Set { key, value }) => {
                    let notice = format!("Set {} = {} ({})", key, value, value.kind());
                    working.insert(key, value);
                    self.approver.notify(&notice).await;
                }
                Err(e) => {
                    tracing::debug!(input = %line, "Rejected edit: {}", e);
                    self.approver.notify(&e.to_string()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(required: bool, auto_low: bool) -> ApprovalPolicy {
        ApprovalPolicy {
            human_approval_required: required,
            auto_approve_low_risk: auto_low,
            ..Default::default()
        }
    }

    #[test]
    fn test_low_risk_rule_takes_precedence() {
        let p = policy(false, true);
        assert_eq!(auto_approval(&p, RiskLevel::Low), Some(LOW_RISK_MESSAGE));
        assert_eq!(auto_approval(&p, RiskLevel::Medium), Some(NOT_REQUIRED_MESSAGE));
        assert_eq!(auto_approval(&p, RiskLevel::High), None);
        assert_eq!(auto_approval(&p, RiskLevel::Critical), None);
    }

    #[test]
    fn test_not_required_without_low_risk_flag() {
        let p = policy(false, false);
        assert_eq!(auto_approval(&p, RiskLevel::Low), Some(NOT_REQUIRED_MESSAGE));
        assert_eq!(auto_approval(&p, RiskLevel::Medium), Some(NOT_REQUIRED_MESSAGE));
        assert_eq!(auto_approval(&p, RiskLevel::High), None);
    }

    #[test]
    fn test_required_blocks_every_bypass() {
        for auto_low in [true, false] {
            let p = policy(true, auto_low);
            for risk in RiskLevel::ALL {
                assert_eq!(auto_approval(&p, risk), None, "{:?} {}", risk, auto_low);
            }
        }
    }
}
