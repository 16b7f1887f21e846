//! Non-interactive approvers for CI, dry runs, and tests.

use crate::approval::params::ActionParams;
use crate::approval::types::{ApproverChoice, Presentation};
use crate::approval::{Approver, ApproverError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Approves everything without prompting.
/// Edits are committed unchanged if the gate ever asks for one.
pub struct AutoApproval;

#[async_trait]
impl Approver for AutoApproval {
    async fn choose(&self, _view: &Presentation<'_>) -> Result<ApproverChoice, ApproverError> {
        Ok(ApproverChoice::Approve)
    }

    async fn read_edit(
        &self,
        _original: &ActionParams,
        _working: &ActionParams,
    ) -> Result<String, ApproverError> {
        Ok("done".to_string())
    }
}

/// Rejects everything that reaches a human.
pub struct AutoDeny;

#[async_trait]
impl Approver for AutoDeny {
    async fn choose(&self, _view: &Presentation<'_>) -> Result<ApproverChoice, ApproverError> {
        Ok(ApproverChoice::Reject {
            reason: Some("auto-deny mode".to_string()),
        })
    }

    async fn read_edit(
        &self,
        _original: &ActionParams,
        _working: &ActionParams,
    ) -> Result<String, ApproverError> {
        Ok("cancel".to_string())
    }
}

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Answer at the main prompt
    Choice(ApproverChoice),
    /// Line typed in the modify sub-loop
    Edit(String),
    /// Behave like Ctrl-C
    Interrupt,
    /// Never answer (exercises timeouts and cancellation)
    Stall,
}

impl ScriptStep {
    pub fn edit(line: &str) -> Self {
        ScriptStep::Edit(line.to_string())
    }

    pub fn reject(reason: &str) -> Self {
        ScriptStep::Choice(ApproverChoice::Reject {
            reason: Some(reason.to_string()),
        })
    }
}

impl From<ApproverChoice> for ScriptStep {
    fn from(choice: ApproverChoice) -> Self {
        ScriptStep::Choice(choice)
    }
}

/// Replays a fixed script of answers and records what it was shown.
///
/// Once the script runs out every prompt fails with `ApproverError::Closed`,
/// which the gate resolves as REJECTED.
pub struct ScriptedApprover {
    script: Mutex<VecDeque<ScriptStep>>,
    events: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedApprover {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            events: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long before every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Everything that happened, in order: `present:<action>`, `choose:<action>`,
    /// `info:<action>`, `edit`, `notify:<message>`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Action types in the order they were presented.
    pub fn presented(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("present:").map(str::to_string))
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("notify:").map(str::to_string))
            .collect()
    }

    /// Steps not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn log(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    async fn next_step(&self) -> Option<ScriptStep> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn present(&self, view: &Presentation<'_>) -> Result<(), ApproverError> {
        self.log(format!("present:{}", view.request.action_type));
        Ok(())
    }

    async fn choose(&self, view: &Presentation<'_>) -> Result<ApproverChoice, ApproverError> {
        self.log(format!("choose:{}", view.request.action_type));
        match self.next_step().await {
            Some(ScriptStep::Choice(choice)) => Ok(choice),
            Some(ScriptStep::Interrupt) => Err(ApproverError::Interrupted),
            Some(ScriptStep::Stall) => std::future::pending().await,
            Some(step @ ScriptStep::Edit(_)) => {
                tracing::warn!("Script expected a choice, found {:?}", step);
                Err(ApproverError::Closed)
            }
            None => Err(ApproverError::Closed),
        }
    }

    async fn read_edit(
        &self,
        _original: &ActionParams,
        _working: &ActionParams,
    ) -> Result<String, ApproverError> {
        self.log("edit".to_string());
        match self.next_step().await {
            Some(ScriptStep::Edit(line)) => Ok(line),
            Some(ScriptStep::Interrupt) => Err(ApproverError::Interrupted),
            Some(ScriptStep::Stall) => std::future::pending().await,
            Some(step @ ScriptStep::Choice(_)) => {
                tracing::warn!("Script expected an edit, found {:?}", step);
                Err(ApproverError::Closed)
            }
            None => Err(ApproverError::Closed),
        }
    }

    async fn show_info(&self, view: &Presentation<'_>) -> Result<(), ApproverError> {
        self.log(format!("info:{}", view.request.action_type));
        Ok(())
    }

    async fn notify(&self, message: &str) {
        self.log(format!("notify:{}", message));
    }
}
