//! Approval session — carries the "skip for the rest of the session" switch.
//!
//! A session is passed to every `ApprovalGate::resolve` call. Clones share the
//! same flag, so a skip made while resolving one workflow's request applies to
//! every other workflow driven by the same session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ApprovalSession {
    id: Uuid,
    skipped: Arc<AtomicBool>,
}

impl ApprovalSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            skipped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the approver chose "skip" in this session.
    pub fn is_overridden(&self) -> bool {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Pre-authorize every remaining request in the session.
    pub fn skip_remaining(&self) {
        if !self.skipped.swap(true, Ordering::SeqCst) {
            tracing::info!(session = %self.id, "Approval disabled for the rest of the session");
        }
    }

    /// Re-enable interactive approval (configuration reload).
    pub fn reset(&self) {
        self.skipped.store(false, Ordering::SeqCst);
    }
}

impl Default for ApprovalSession {
    fn default() -> Self {
        Self::new()
    }
}
