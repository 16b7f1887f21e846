pub mod defaults;
pub mod parser;
pub mod types;

pub use parser::{load_settings, parse_settings_file, parse_settings_str, LoadedSettings};
pub use types::{
    ApprovalSettings, CapabilityCommand, CapabilitySettings, LedgerSettings, OrchestratorSettings,
    ProjectSettings, Settings,
};
