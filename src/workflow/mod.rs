pub mod orchestrator;
pub mod types;
pub mod webhook;

pub use orchestrator::{CrewStatus, ExecutionMode, WorkflowOrchestrator};
pub use types::{
    BatchReport, Phase, WorkflowError, WorkflowKind, WorkflowReport, WorkflowRequest,
    WorkflowState,
};
