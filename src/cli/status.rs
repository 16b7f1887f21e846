//! `pmcrew status` and `pmcrew config` — show the crew and its settings.

use crate::cli::run::build_crew;
use crate::cli::GlobalOptions;
use crate::config::load_settings;
use crate::ledger::JournalReader;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn run_status(options: &GlobalOptions) -> Result<()> {
    let crew = build_crew(options, false)?;
    let status = crew.orchestrator.status();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let config = &status.configuration;
    let on_off = |b: bool| if b { "on".green() } else { "off".red() };

    println!();
    println!("  {}  {}", "pmcrew".bold(), "crew status".dimmed());
    println!("  {}", "━".repeat(41).dimmed());
    println!();
    for key in ["project_name", "repository", "current_sprint", "channel"] {
        if let Some(value) = status.project_context.get(key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                println!("  {:<16}{}", format!("{}:", key), value.cyan());
            }
        }
    }

    println!();
    println!("  {}", "Agents".bold());
    for (kind, name) in &status.agents {
        let entry = crew.loaded.settings.capabilities.get(*kind);
        let how = entry.command.as_deref().unwrap_or("dry run");
        println!("    {:<12} {:<10} {}", kind.to_string(), name, how.dimmed());
    }

    println!();
    println!("  {}", "Approval".bold());
    println!("    human approval required  {}", on_off(config.human_approval_required));
    println!("    auto-approve low risk    {}", on_off(config.auto_approve_low_risk));
    println!("    timeout                  {}s", config.approval_timeout_secs);
    println!("    execution mode           {:?}", config.execution_mode);

    if let Ok(dir) = crew.loaded.settings.ledger.journal_directory() {
        if let Ok(entries) = JournalReader::with_dir(&dir).read_latest() {
            if !entries.is_empty() {
                let summary = crate::ledger::LedgerSummary::from_entries(
                    &entries,
                    crew.loaded.settings.ledger.recent_limit,
                );
                println!();
                println!("  Last session: {}", summary.one_line());
            }
        }
    }
    println!();

    Ok(())
}

/// Print the effective configuration (file plus environment overrides).
pub fn run_config(options: &GlobalOptions) -> Result<()> {
    let loaded = load_settings(options.config.as_deref())?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&loaded.settings)?);
        return Ok(());
    }

    match &loaded.source {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found, built-in defaults"),
    }
    let yaml =
        serde_yaml::to_string(&loaded.settings).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}
