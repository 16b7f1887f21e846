pub mod gate;
pub mod interrupt;
pub mod params;
pub mod scripted;
pub mod session;
pub mod terminal;
pub mod types;

use async_trait::async_trait;

pub use gate::ApprovalGate;
pub use interrupt::{InterruptListener, InterruptRouter};
pub use params::{ActionParams, ParamValue};
pub use scripted::{AutoApproval, AutoDeny, ScriptStep, ScriptedApprover};
pub use session::ApprovalSession;
pub use terminal::TerminalApprover;
pub use types::{
    ApprovalPolicy, ApprovalRequest, ApprovalStatus, ApproverChoice, ContextMap, Presentation,
    Resolution,
};

/// Why an approver could not answer. The gate turns every variant into a
/// REJECTED resolution.
#[derive(Debug, thiserror::Error)]
pub enum ApproverError {
    #[error("interrupted by user")]
    Interrupted,
    #[error("approver input closed")]
    Closed,
    #[error("approver I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The human side of the approval protocol.
/// Implementations can be terminal-based, chat-based, scripted, etc.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Show a request for the first time.
    async fn present(&self, _view: &Presentation<'_>) -> Result<(), ApproverError> {
        Ok(())
    }

    /// Ask for the next choice at the main prompt.
    async fn choose(&self, view: &Presentation<'_>) -> Result<ApproverChoice, ApproverError>;

    /// Read one line in the modify sub-loop: `key=value`, `done`, or `cancel`.
    async fn read_edit(
        &self,
        original: &ActionParams,
        working: &ActionParams,
    ) -> Result<String, ApproverError>;

    /// Show time left, request metadata, and the full context.
    async fn show_info(&self, _view: &Presentation<'_>) -> Result<(), ApproverError> {
        Ok(())
    }

    /// Feedback line (edit accepted, bad input, final decision, ...).
    async fn notify(&self, _message: &str) {}
}
