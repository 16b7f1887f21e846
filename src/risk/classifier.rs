//! Risk classifier — maps an action to a RiskLevel.
//!
//! Rules are checked in order and the first match wins:
//! 1. action type matches a medium pattern → MEDIUM
//! 2. action type matches a high pattern → HIGH
//! 3. the critical marker appears anywhere in the serialized parameters → CRITICAL
//! 4. otherwise the caller's default
//!
//! Patterns are globs compiled once at construction, not per call.

use crate::approval::params::ActionParams;
use crate::risk::types::RiskLevel;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Destructive or state-mutating actions on already-published artifacts.
pub const DEFAULT_MEDIUM_ACTIONS: &[&str] = &["delete_issue", "close_issue", "merge_pull_request"];

/// Actions that kick off external automation.
pub const DEFAULT_HIGH_ACTIONS: &[&str] = &["trigger_workflow", "update_project_item_status"];

pub const DEFAULT_CRITICAL_MARKER: &str = "critical";

/// Configurable classification rules (the `risk:` section of the config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    pub medium_actions: Vec<String>,
    pub high_actions: Vec<String>,
    pub critical_marker: String,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            medium_actions: DEFAULT_MEDIUM_ACTIONS.iter().map(|s| s.to_string()).collect(),
            high_actions: DEFAULT_HIGH_ACTIONS.iter().map(|s| s.to_string()).collect(),
            critical_marker: DEFAULT_CRITICAL_MARKER.to_string(),
        }
    }
}

/// A pre-compiled set of glob patterns over action names.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl CompiledMatcher {
    /// Compile a list of glob patterns. Returns an error if any pattern is malformed.
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.trim())?);
        }
        Ok(Self {
            patterns: patterns.to_vec(),
            set: builder.build()?,
        })
    }

    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn matches(&self, action_type: &str) -> bool {
        self.set.is_match(action_type)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Pure, deterministic risk classification.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    medium: CompiledMatcher,
    high: CompiledMatcher,
    critical_marker: String,
}

impl RiskClassifier {
    pub fn new(rules: &RiskRules) -> Result<Self, globset::Error> {
        Ok(Self {
            medium: CompiledMatcher::new(&rules.medium_actions)?,
            high: CompiledMatcher::new(&rules.high_actions)?,
            critical_marker: rules.critical_marker.trim().to_lowercase(),
        })
    }

    /// Classify an action. Never fails and has no side effects.
    pub fn classify(
        &self,
        action_type: &str,
        params: &ActionParams,
        default: RiskLevel,
    ) -> RiskLevel {
        if self.medium.matches(action_type) {
            RiskLevel::Medium
        } else if self.high.matches(action_type) {
            RiskLevel::High
        } else if self.has_critical_marker(params) {
            RiskLevel::Critical
        } else {
            default
        }
    }

    /// Like `classify`, but never returns less than `floor`. Used by workflows
    /// that carry a fixed risk level of their own.
    pub fn classify_at_least(
        &self,
        action_type: &str,
        params: &ActionParams,
        floor: RiskLevel,
    ) -> RiskLevel {
        self.classify(action_type, params, floor).max(floor)
    }

    fn has_critical_marker(&self, params: &ActionParams) -> bool {
        if self.critical_marker.is_empty() {
            return false;
        }
        params
            .to_json()
            .to_string()
            .to_lowercase()
            .contains(&self.critical_marker)
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        RiskClassifier::new(&RiskRules::default()).unwrap_or_else(|e| {
            tracing::warn!("Default risk rules failed to compile: {}", e);
            Self {
                medium: CompiledMatcher::empty(),
                high: CompiledMatcher::empty(),
                critical_marker: DEFAULT_CRITICAL_MARKER.to_string(),
            }
        })
    }
}
