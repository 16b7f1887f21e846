//! Typed configuration. Every section has defaults, so an empty file (or no
//! file at all) is a valid configuration.

use crate::approval::{ApprovalPolicy, ContextMap};
use crate::capability::CapabilityKind;
use crate::ledger::journal::Journal;
use crate::risk::RiskRules;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub project: ProjectSettings,
    pub approval: ApprovalSettings,
    pub risk: RiskRules,
    pub capabilities: CapabilitySettings,
    pub orchestrator: OrchestratorSettings,
    pub ledger: LedgerSettings,
}

/// Project context handed to every workflow and shown to the approver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub name: String,
    pub description: String,
    /// `owner/repo`
    pub repository: Option<String>,
    pub current_sprint: Option<String>,
    pub team_members: Vec<String>,
    /// Where standup reports are posted
    pub channel: String,
    /// Project board identifier, if the team uses one
    pub board_id: Option<String>,
    /// Whether monitoring should look at CI workflows
    pub ci_enabled: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name: "Untitled project".to_string(),
            description: String::new(),
            repository: None,
            current_sprint: None,
            team_members: Vec::new(),
            channel: "#pm-updates".to_string(),
            board_id: None,
            ci_enabled: true,
        }
    }
}

impl ProjectSettings {
    pub fn repository_or_unknown(&self) -> &str {
        self.repository.as_deref().unwrap_or("unknown")
    }

    /// The project context as a JSON mapping.
    pub fn context(&self) -> ContextMap {
        let context = json!({
            "project_name": self.name,
            "project_description": self.description,
            "repository": self.repository_or_unknown(),
            "board_id": self.board_id.as_deref().unwrap_or_default(),
            "current_sprint": self.current_sprint.as_deref().unwrap_or_default(),
            "team_members": self.team_members,
            "channel": self.channel,
        });
        match context {
            Value::Object(map) => map,
            _ => ContextMap::new(),
        }
    }

    /// Rows for the approver's info view.
    pub fn details(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("Project".to_string(), self.name.clone()),
            ("Repository".to_string(), self.repository_or_unknown().to_string()),
        ];
        if let Some(sprint) = &self.current_sprint {
            rows.push(("Sprint".to_string(), sprint.clone()));
        }
        if !self.team_members.is_empty() {
            rows.push(("Team".to_string(), self.team_members.join(", ")));
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub human_approval_required: bool,
    pub auto_approve_low_risk: bool,
    pub timeout_secs: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            human_approval_required: true,
            auto_approve_low_risk: false,
            timeout_secs: 300,
        }
    }
}

impl ApprovalSettings {
    pub fn policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            human_approval_required: self.human_approval_required,
            auto_approve_low_risk: self.auto_approve_low_risk,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// How to run one capability. Without a command the capability is a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityCommand {
    pub command: Option<String>,
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySettings {
    pub planning: CapabilityCommand,
    pub reporting: CapabilityCommand,
    pub monitoring: CapabilityCommand,
}

impl CapabilitySettings {
    pub fn get(&self, kind: CapabilityKind) -> &CapabilityCommand {
        match kind {
            CapabilityKind::Planning => &self.planning,
            CapabilityKind::Reporting => &self.reporting,
            CapabilityKind::Monitoring => &self.monitoring,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Run the workflows of a batch at the same time instead of one after another
    pub concurrent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Mirror ledger entries to a JSONL file
    pub journal: bool,
    /// Defaults to ~/.pmcrew/ledger
    pub directory: Option<PathBuf>,
    /// Entries shown in summaries
    pub recent_limit: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            journal: true,
            directory: None,
            recent_limit: 5,
        }
    }
}

impl LedgerSettings {
    pub fn journal_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => Journal::default_directory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_fills_unknowns() {
        let project = ProjectSettings::default();
        let context = project.context();
        assert_eq!(context["repository"], "unknown");
        assert_eq!(context["channel"], "#pm-updates");
        assert_eq!(context["current_sprint"], "");
        assert_eq!(context["team_members"], json!([]));
    }

    #[test]
    fn test_details_skip_empty_fields() {
        let project = ProjectSettings {
            name: "Widgets".to_string(),
            repository: Some("acme/widgets".to_string()),
            current_sprint: Some("Sprint 7".to_string()),
            ..Default::default()
        };
        let labels: Vec<String> = project.details().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["Project", "Repository", "Sprint"]);
    }

    #[test]
    fn test_policy_from_approval_settings() {
        let settings = ApprovalSettings {
            timeout_secs: 30,
            ..Default::default()
        };
        let policy = settings.policy();
        assert!(policy.human_approval_required);
        assert!(!policy.auto_approve_low_risk);
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }
}
