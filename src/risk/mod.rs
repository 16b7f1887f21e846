pub mod classifier;
pub mod types;

pub use classifier::{RiskClassifier, RiskRules};
pub use types::RiskLevel;
