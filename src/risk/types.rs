//! Risk levels for agent-proposed actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse severity of a gated action. The derived ordering is the
/// auto-approval threshold order: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Parse a risk level from user input. Unknown strings yield `None`.
    pub fn from_str_loose(s: &str) -> Option<RiskLevel> {
        match s.to_lowercase().trim() {
            "low" | "l" => Some(RiskLevel::Low),
            "medium" | "med" | "m" => Some(RiskLevel::Medium),
            "high" | "h" => Some(RiskLevel::High),
            "critical" | "crit" | "c" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// HIGH and CRITICAL always need a human unless the session was skipped.
    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}
