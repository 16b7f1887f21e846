//! Agent capabilities — the work that runs once an action is approved.
//!
//! The orchestrator treats a capability as opaque: a task text and a context
//! go in, a response or a failure comes out. Which program actually produces
//! the plan or the report is configured per capability.

pub mod command;

use crate::approval::ContextMap;
use crate::config::CapabilitySettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use command::CommandCapability;

/// What a capability returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub agent: String,
    pub response: String,
}

/// A capability call that did not succeed. The orchestrator reports it as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{agent}: {message}")]
pub struct CapabilityError {
    pub agent: String,
    pub message: String,
}

impl CapabilityError {
    pub fn new(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        task: &str,
        context: &ContextMap,
    ) -> Result<CapabilityOutput, CapabilityError>;
}

/// The three capabilities a crew is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Planning,
    Reporting,
    Monitoring,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Planning,
        CapabilityKind::Reporting,
        CapabilityKind::Monitoring,
    ];

    /// Agent name used when nothing more specific is configured.
    pub fn agent_name(&self) -> &'static str {
        match self {
            CapabilityKind::Planning => "planner",
            CapabilityKind::Reporting => "reporter",
            CapabilityKind::Monitoring => "monitor",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Planning => write!(f, "planning"),
            CapabilityKind::Reporting => write!(f, "reporting"),
            CapabilityKind::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Responds without doing anything. Used when no command is configured.
pub struct DryRunCapability {
    name: String,
}

impl DryRunCapability {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AgentCapability for DryRunCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        task: &str,
        _context: &ContextMap,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let headline = task.lines().next().unwrap_or_default();
        Ok(CapabilityOutput {
            agent: self.name.clone(),
            response: format!("[dry-run] {} would run: {}", self.name, headline),
        })
    }
}

#[derive(Clone)]
pub struct CapabilitySet {
    planning: Arc<dyn AgentCapability>,
    reporting: Arc<dyn AgentCapability>,
    monitoring: Arc<dyn AgentCapability>,
}

impl CapabilitySet {
    pub fn new(
        planning: Arc<dyn AgentCapability>,
        reporting: Arc<dyn AgentCapability>,
        monitoring: Arc<dyn AgentCapability>,
    ) -> Self {
        Self {
            planning,
            reporting,
            monitoring,
        }
    }

    pub fn dry_run() -> Self {
        Self::new(
            Arc::new(DryRunCapability::new("planner")),
            Arc::new(DryRunCapability::new("reporter")),
            Arc::new(DryRunCapability::new("monitor")),
        )
    }

    /// Command-backed capabilities where a command is configured, dry-run otherwise.
    pub fn from_settings(settings: &CapabilitySettings) -> Self {
        let build = |kind: CapabilityKind| -> Arc<dyn AgentCapability> {
            let entry = settings.get(kind);
            match &entry.command {
                Some(command) => Arc::new(
                    CommandCapability::new(kind.agent_name(), command)
                        .with_workdir(entry.workdir.clone()),
                ),
                None => Arc::new(DryRunCapability::new(kind.agent_name())),
            }
        };
        Self::new(
            build(CapabilityKind::Planning),
            build(CapabilityKind::Reporting),
            build(CapabilityKind::Monitoring),
        )
    }

    pub fn get(&self, kind: CapabilityKind) -> Arc<dyn AgentCapability> {
        match kind {
            CapabilityKind::Planning => self.planning.clone(),
            CapabilityKind::Reporting => self.reporting.clone(),
            CapabilityKind::Monitoring => self.monitoring.clone(),
        }
    }

    pub fn names(&self) -> BTreeMap<CapabilityKind, String> {
        CapabilityKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind).name().to_string()))
            .collect()
    }
}
