//! Ledger journal — append-only JSONL mirror of the in-memory ledger.
//!
//! Writes to `~/.pmcrew/ledger/{session_id}.jsonl`, one JSON object per line.
//! Flushes after every write so a crash loses at most the entry being written.

use crate::ledger::types::LedgerEntry;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL writer.
pub struct Journal {
    path: PathBuf,
    file: File,
    entry_count: usize,
}

impl Journal {
    /// Open the journal for a session inside `dir`, creating both if needed.
    pub fn for_session(dir: impl AsRef<Path>, session_id: &str) -> Result<Self> {
        Self::with_path(dir.as_ref().join(format!("{}.jsonl", session_id)))
    }

    /// Open (or create) a journal at a specific path.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create journal directory: {}", parent.display())
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal: {}", path.display()))?;

        Ok(Self {
            path,
            file,
            entry_count: 0,
        })
    }

    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize ledger entry")?;
        writeln!(self.file, "{}", json).context("Failed to write ledger entry")?;
        self.file.flush().context("Failed to flush journal")?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written through this handle.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Default journal directory (~/.pmcrew/ledger/).
    pub fn default_directory() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".pmcrew").join("ledger"))
    }
}

/// Reads journal files back for the `history` command.
pub struct JournalReader {
    dir: PathBuf,
}

impl JournalReader {
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn read_session(&self, session_id: &str) -> Result<Vec<LedgerEntry>> {
        read_file(self.dir.join(format!("{}.jsonl", session_id)))
    }

    /// Entries of the most recently modified journal, or none if there is no journal yet.
    pub fn read_latest(&self) -> Result<Vec<LedgerEntry>> {
        match self.latest_journal()? {
            Some(path) => read_file(path),
            None => Ok(Vec::new()),
        }
    }

    fn latest_journal(&self) -> Result<Option<PathBuf>> {
        let mut journals = self.journal_files()?;
        journals.sort_by(|a, b| {
            let a_time = fs::metadata(a).and_then(|m| m.modified()).ok();
            let b_time = fs::metadata(b).and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });
        Ok(journals.into_iter().next())
    }

    /// Session IDs with a journal, sorted.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions: Vec<String> = self
            .journal_files()?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    fn journal_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list journals in {}", self.dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |e| e == "jsonl"))
            .collect())
    }
}

/// Read every entry from one journal file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<LedgerEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Failed to parse ledger entry at line {}", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::ApprovalStatus;
    use crate::risk::RiskLevel;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(action_type: &str, status: ApprovalStatus) -> LedgerEntry {
        LedgerEntry {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            risk_level: RiskLevel::Medium,
            status,
            description: "test".to_string(),
            message: "approved by user".to_string(),
        }
    }

    #[test]
    fn test_write_and_read_journal() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::for_session(tmp.path(), "session-a").unwrap();

        journal.append(&entry("daily_standup", ApprovalStatus::Approved)).unwrap();
        journal.append(&entry("monitoring_check", ApprovalStatus::Rejected)).unwrap();
        assert_eq!(journal.entry_count(), 2);

        let reader = JournalReader::with_dir(tmp.path());
        let entries = reader.read_session("session-a").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action_type, "daily_standup");
        assert_eq!(entries[1].status, ApprovalStatus::Rejected);
    }

    #[test]
    fn test_append_only_across_handles() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.jsonl");

        Journal::with_path(&path)
            .unwrap()
            .append(&entry("first", ApprovalStatus::Approved))
            .unwrap();
        Journal::with_path(&path)
            .unwrap()
            .append(&entry("second", ApprovalStatus::Timeout))
            .unwrap();

        let entries = read_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action_type, "second");
    }

    #[test]
    fn test_reader_on_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let reader = JournalReader::with_dir(tmp.path().join("nope"));
        assert!(reader.read_latest().unwrap().is_empty());
        assert!(reader.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_line_reports_line_number() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.jsonl");
        fs::write(&path, "\n{not json}\n").unwrap();
        let err = read_file(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
