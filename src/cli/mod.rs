pub mod history;
pub mod init;
pub mod run;
pub mod shell;
pub mod status;

use clap::ValueEnum;
use std::path::PathBuf;

/// Who answers approval prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ApprovalMode {
    /// Interactive prompt on this terminal
    #[default]
    Terminal,
    /// Approve everything (CI, dry runs)
    Auto,
    /// Reject everything that needs a human
    Deny,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub approval: ApprovalMode,
    pub json: bool,
}
