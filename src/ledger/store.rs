//! The interaction ledger: in-memory audit trail plus the pending set.
//!
//! Entries and the pending set live behind a single mutex, so a summary
//! taken while a request is being completed never sees the request both
//! pending and recorded, or neither.
//!
//! The journal has its own lock and is written after the state lock is
//! released, so readers never wait on file I/O. Concurrent writers may reach
//! the journal in a different order than the in-memory entries.

use crate::ledger::journal::Journal;
use crate::ledger::types::{LedgerEntry, LedgerSummary, PendingRequest};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Number of entries returned in `LedgerSummary::recent` by default.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    pending: Vec<PendingRequest>,
}

pub struct InteractionLedger {
    state: Mutex<LedgerState>,
    journal: Mutex<Option<Journal>>,
    recent_limit: usize,
}

impl InteractionLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            journal: Mutex::new(None),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Mirror every appended entry to a JSONL journal.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        *self.journal.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(journal);
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    // Poisoning is ignored: every mutation leaves the state consistent.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a request visible in the pending set.
    pub fn register_pending(&self, request: PendingRequest) {
        self.lock().pending.push(request);
    }

    /// Append an entry. Never fails; journal errors are logged and dropped.
    pub fn record(&self, entry: LedgerEntry) {
        self.lock().entries.push(entry.clone());
        self.write_journal(&entry);
    }

    /// Remove a request from the pending set and append its entry in one step.
    /// Returns whether the request was pending.
    pub fn complete(&self, request_id: Uuid, entry: LedgerEntry) -> bool {
        let was_pending = {
            let mut state = self.lock();
            let before = state.pending.len();
            state.pending.retain(|p| p.id != request_id);
            state.entries.push(entry.clone());
            state.pending.len() != before
        };
        self.write_journal(&entry);
        was_pending
    }

    fn write_journal(&self, entry: &LedgerEntry) {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(journal) = journal.as_mut() {
            if let Err(e) = journal.append(entry) {
                tracing::warn!("Failed to journal ledger entry: {:#}", e);
            }
        }
    }

    /// Snapshot of the pending set, in arrival order.
    pub fn pending(&self) -> Vec<PendingRequest> {
        self.lock().pending.clone()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> LedgerSummary {
        let state = self.lock();
        let mut summary = LedgerSummary::from_entries(&state.entries, self.recent_limit);
        summary.pending = state.pending.len();
        summary
    }

    pub fn journal_path(&self) -> Option<std::path::PathBuf> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|j| j.path().to_path_buf())
    }
}

impl Default for InteractionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::ApprovalStatus;
    use crate::risk::RiskLevel;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pending(action_type: &str) -> PendingRequest {
        PendingRequest {
            id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            risk_level: RiskLevel::Medium,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    fn entry_for(p: &PendingRequest, status: ApprovalStatus) -> LedgerEntry {
        LedgerEntry {
            timestamp: Utc::now(),
            request_id: p.id,
            action_type: p.action_type.clone(),
            risk_level: p.risk_level,
            status,
            description: p.description.clone(),
            message: String::new(),
        }
    }

    #[test]
    fn test_complete_removes_pending_and_records() {
        let ledger = InteractionLedger::new();
        let a = pending("a");
        let b = pending("b");
        ledger.register_pending(a.clone());
        ledger.register_pending(b.clone());
        assert_eq!(ledger.summary().pending, 2);

        assert!(ledger.complete(a.id, entry_for(&a, ApprovalStatus::Approved)));
        assert_eq!(ledger.pending(), vec![b.clone()]);
        assert_eq!(ledger.len(), 1);

        // Completing an unknown id still records, but reports it was not pending
        assert!(!ledger.complete(a.id, entry_for(&a, ApprovalStatus::Approved)));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_summary_counts_match_total() {
        let ledger = InteractionLedger::new().with_recent_limit(3);
        let statuses = [
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
            ApprovalStatus::Modified,
            ApprovalStatus::Timeout,
            ApprovalStatus::Approved,
        ];
        for status in statuses {
            let p = pending("x");
            ledger.record(entry_for(&p, status));
        }

        let summary = ledger.summary();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.status_breakdown.values().sum::<usize>(), 5);
        assert_eq!(summary.recent.len(), 3);
    }

    #[test]
    fn test_concurrent_writers() {
        let ledger = Arc::new(InteractionLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let p = pending("parallel");
                        ledger.register_pending(p.clone());
                        ledger.complete(p.id, entry_for(&p, ApprovalStatus::Approved));
                        let summary = ledger.summary();
                        assert_eq!(summary.status_breakdown.values().sum::<usize>(), summary.total);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let summary = ledger.summary();
        assert_eq!(summary.total, 400);
        assert_eq!(summary.pending, 0);
    }

    #[test]
    fn test_entries_are_journaled() {
        let tmp = TempDir::new().unwrap();
        let journal = Journal::for_session(tmp.path(), "s1").unwrap();
        let ledger = InteractionLedger::new().with_journal(journal);

        let p = pending("daily_standup");
        ledger.record(entry_for(&p, ApprovalStatus::Approved));

        let path = ledger.journal_path().unwrap();
        let entries = crate::ledger::journal::read_file(path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, "daily_standup");
    }

    #[test]
    fn test_readers_do_not_wait_for_journal_writes() {
        let tmp = TempDir::new().unwrap();
        let journal = Journal::for_session(tmp.path(), "s1").unwrap();
        let ledger = Arc::new(InteractionLedger::new().with_journal(journal));
        let path = ledger.journal_path().unwrap();

        // Stall the journal while a writer records
        let stalled = ledger.journal.lock().unwrap();
        let writer = {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                let p = pending("monitoring_check");
                ledger.register_pending(p.clone());
                ledger.complete(p.id, entry_for(&p, ApprovalStatus::Approved));
            })
        };

        let (tx, rx) = std::sync::mpsc::channel();
        let reader = {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                while ledger.len() == 0 {
                    std::thread::yield_now();
                }
                tx.send((ledger.summary(), ledger.pending().len())).unwrap();
            })
        };

        let (summary, pending) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.pending, 0);
        assert_eq!(pending, 0);
        assert!(crate::ledger::journal::read_file(&path).unwrap().is_empty());

        drop(stalled);
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(crate::ledger::journal::read_file(&path).unwrap().len(), 1);
    }
}
