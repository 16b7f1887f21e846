//! `pmcrew history` — browse ledger journals of past sessions.

use crate::cli::GlobalOptions;
use crate::config::load_settings;
use crate::ledger::{JournalReader, LedgerEntry, LedgerSummary};
use crate::approval::ApprovalStatus;
use anyhow::{Context, Result};
use colored::Colorize;

#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    pub session: Option<String>,
    pub limit: Option<usize>,
    pub summary_only: bool,
    pub list: bool,
}

pub fn run_history(global: &GlobalOptions, options: &HistoryOptions) -> Result<()> {
    let loaded = load_settings(global.config.as_deref())?;
    let dir = loaded.settings.ledger.journal_directory()?;
    let reader = JournalReader::with_dir(&dir);

    if options.list {
        return list_sessions(&reader, global.json);
    }

    let entries = match &options.session {
        Some(id) => reader
            .read_session(id)
            .with_context(|| format!("Failed to read session: {}", id))?,
        None => reader.read_latest()?,
    };

    let summary = LedgerSummary::from_entries(&entries, loaded.settings.ledger.recent_limit);
    let shown = match options.limit {
        Some(limit) => &entries[entries.len().saturating_sub(limit)..],
        None => &entries[..],
    };

    if global.json {
        let listed: &[LedgerEntry] = if options.summary_only { &[] } else { shown };
        let out = serde_json::json!({
            "entries": listed,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  {} No ledger entries found in {}", "ℹ".blue(), dir.display());
        println!("  Run a workflow first: {}", "pmcrew standup".dimmed());
        println!();
        return Ok(());
    }

    println!();
    if !options.summary_only {
        for entry in shown {
            println!("  {}", format_entry(entry));
        }
        println!();
    }
    println!(
        "  {} {}",
        "─".repeat(40).dimmed(),
        summary.one_line().dimmed()
    );
    println!();

    Ok(())
}

fn list_sessions(reader: &JournalReader, json: bool) -> Result<()> {
    let sessions = reader.list_sessions()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    println!();
    if sessions.is_empty() {
        println!("  {} No sessions found.", "ℹ".blue());
    } else {
        println!("  {} Recorded sessions:", "📋".to_string().bold());
        println!();
        for session in &sessions {
            println!("  • {}", session);
        }
        println!();
        println!("  View a session: {}", "pmcrew history --session <id>".dimmed());
    }
    println!();
    Ok(())
}

pub fn format_entry(entry: &LedgerEntry) -> String {
    let status = match entry.status {
        ApprovalStatus::Approved => "APPROVED".green(),
        ApprovalStatus::Modified => "MODIFIED".yellow(),
        ApprovalStatus::Rejected => "REJECTED".red(),
        ApprovalStatus::Timeout => "TIMEOUT".magenta(),
        ApprovalStatus::Pending => "PENDING".normal(),
    };
    format!(
        "{} {:<9} {:<22} {:<8} {}",
        entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
        status,
        entry.action_type,
        entry.risk_level.to_string(),
        entry.message.dimmed()
    )
}
