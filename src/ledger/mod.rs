pub mod journal;
pub mod store;
pub mod types;

pub use journal::{Journal, JournalReader};
pub use store::InteractionLedger;
pub use types::*;
