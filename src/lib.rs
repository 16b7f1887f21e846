//! pmcrew — approval gate and workflow orchestrator for human-gated
//! project management agents.
//!
//! Every action an agent proposes goes through the `ApprovalGate` before the
//! matching capability runs. The binary entrypoint is in `main.rs`.

pub mod approval;
pub mod capability;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod risk;
pub mod workflow;
