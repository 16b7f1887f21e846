//! Types for the interaction ledger.
//!
//! Every resolved approval request leaves one immutable entry behind,
//! whether it was auto-approved, decided by a human, or timed out.

use crate::approval::types::{ApprovalRequest, ApprovalStatus};
use crate::risk::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single resolved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the request reached its terminal state
    pub timestamp: DateTime<Utc>,

    pub request_id: Uuid,

    /// Kind of action (e.g., "project_planning", "webhook_issues")
    pub action_type: String,

    pub risk_level: RiskLevel,

    /// Terminal status, never `Pending`
    pub status: ApprovalStatus,

    pub description: String,

    /// Resolution message (e.g., "auto-approved (low risk)")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl LedgerEntry {
    pub fn for_request(request: &ApprovalRequest, status: ApprovalStatus, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: request.id,
            action_type: request.action_type.clone(),
            risk_level: request.risk_level,
            status,
            description: request.description.clone(),
            message: message.into(),
        }
    }
}

/// A request currently waiting in the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: Uuid,
    pub action_type: String,
    pub risk_level: RiskLevel,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ApprovalRequest> for PendingRequest {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            id: request.id,
            action_type: request.action_type.clone(),
            risk_level: request.risk_level,
            description: request.description.clone(),
            created_at: request.created_at,
        }
    }
}

/// Summary statistics over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub status_breakdown: BTreeMap<ApprovalStatus, usize>,
    pub risk_breakdown: BTreeMap<RiskLevel, usize>,
    /// Most recent entries, oldest first
    pub recent: Vec<LedgerEntry>,
    /// Requests still waiting when the summary was taken
    pub pending: usize,
}

impl LedgerSummary {
    /// Build a summary from a slice of entries.
    pub fn from_entries(entries: &[LedgerEntry], recent_limit: usize) -> Self {
        let mut summary = LedgerSummary {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            *summary.status_breakdown.entry(entry.status).or_insert(0) += 1;
            *summary.risk_breakdown.entry(entry.risk_level).or_insert(0) += 1;
        }

        let skip = entries.len().saturating_sub(recent_limit);
        summary.recent = entries[skip..].to_vec();
        summary
    }

    pub fn count(&self, status: ApprovalStatus) -> usize {
        self.status_breakdown.get(&status).copied().unwrap_or(0)
    }

    /// Format as a human-readable one-liner for terminal output.
    pub fn one_line(&self) -> String {
        if self.total == 0 {
            return "No interactions yet".to_string();
        }
        format!(
            "{} interactions | {} approved | {} modified | {} rejected | {} timed out",
            self.total,
            self.count(ApprovalStatus::Approved),
            self.count(ApprovalStatus::Modified),
            self.count(ApprovalStatus::Rejected),
            self.count(ApprovalStatus::Timeout),
        )
    }
}
