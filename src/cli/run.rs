//! `pmcrew plan | standup | monitor | run-all | webhook` — run workflows.
//!
//! 1. Load settings
//! 2. Set up the ledger (with its journal) and the approver
//! 3. Build the orchestrator and run the batch
//! 4. Print the reports and the ledger summary

use crate::approval::{
    Approver, ApprovalSession, AutoApproval, AutoDeny, InterruptRouter, TerminalApprover,
};
use crate::capability::CapabilitySet;
use crate::cli::{ApprovalMode, GlobalOptions};
use crate::config::{load_settings, LoadedSettings};
use crate::ledger::{InteractionLedger, Journal};
use crate::workflow::{BatchReport, WorkflowOrchestrator, WorkflowReport, WorkflowRequest};
use anyhow::{Context, Result};
use colored::Colorize;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a command needs to run workflows.
pub struct Crew {
    pub orchestrator: WorkflowOrchestrator,
    pub loaded: LoadedSettings,
    pub journal_path: Option<PathBuf>,
    /// Stdin reader shared by approval prompts and the shell.
    pub terminal: Arc<TerminalApprover>,
    pub interrupts: InterruptRouter,
}

pub fn approver_for(mode: ApprovalMode, terminal: &Arc<TerminalApprover>) -> Arc<dyn Approver> {
    match mode {
        ApprovalMode::Terminal => terminal.clone(),
        ApprovalMode::Auto => Arc::new(AutoApproval),
        ApprovalMode::Deny => Arc::new(AutoDeny),
    }
}

/// Build the crew. `journal` controls whether this run writes a ledger journal.
pub fn build_crew(options: &GlobalOptions, journal: bool) -> Result<Crew> {
    let loaded = load_settings(options.config.as_deref())?;
    let settings = &loaded.settings;
    let session = ApprovalSession::new();

    let mut ledger = InteractionLedger::new().with_recent_limit(settings.ledger.recent_limit);
    if journal && settings.ledger.journal {
        let dir = settings.ledger.journal_directory()?;
        let journal = Journal::for_session(&dir, &session.id().to_string())
            .context("Failed to open ledger journal")?;
        ledger = ledger.with_journal(journal);
    }
    let ledger = Arc::new(ledger);
    let journal_path = ledger.journal_path();

    let interrupts = InterruptRouter::new();
    let terminal = Arc::new(TerminalApprover::new().with_interrupts(interrupts.clone()));

    let orchestrator = WorkflowOrchestrator::with_session(
        settings,
        approver_for(options.approval, &terminal),
        ledger,
        CapabilitySet::from_settings(&settings.capabilities),
        session,
    )?;

    Ok(Crew {
        orchestrator,
        loaded,
        journal_path,
        terminal,
        interrupts,
    })
}

/// Run a batch of workflows. Returns whether every workflow succeeded.
pub async fn run_workflows(options: &GlobalOptions, requests: Vec<WorkflowRequest>) -> Result<bool> {
    run_crew(options, |orchestrator| async move { orchestrator.run_batch(requests).await }).await
}

/// Planning (when the brief is not blank), then standup and monitoring.
pub async fn run_full(options: &GlobalOptions, brief: Option<String>) -> Result<bool> {
    run_crew(options, |orchestrator| async move {
        orchestrator.run_full(brief.as_deref()).await
    })
    .await
}

async fn run_crew<F, Fut>(options: &GlobalOptions, run: F) -> Result<bool>
where
    F: FnOnce(WorkflowOrchestrator) -> Fut,
    Fut: Future<Output = BatchReport>,
{
    let crew = build_crew(options, true)?;

    if !options.json {
        print_header(&crew);
    }

    let watcher = spawn_interrupt_watcher(crew.interrupts.clone(), crew.orchestrator.clone());
    let batch = run(crew.orchestrator.clone()).await;
    watcher.abort();

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&batch).context("Failed to serialize report")?
        );
    } else {
        print_batch(&batch, &crew);
    }

    Ok(batch.overall_success)
}

/// Read a webhook payload from a file, or stdin for `-`. No path means `{}`.
pub fn read_payload(path: Option<&Path>) -> Result<serde_json::Value> {
    let raw = match path {
        None => return Ok(serde_json::json!({})),
        Some(p) if p == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read payload from stdin")?;
            buf
        }
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read payload file: {}", p.display()))?,
    };
    serde_json::from_str(&raw).context("Webhook payload is not valid JSON")
}

/// The only Ctrl-C listener while workflows run.
pub(crate) fn spawn_interrupt_watcher(
    interrupts: InterruptRouter,
    orchestrator: WorkflowOrchestrator,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !on_interrupt(&interrupts, &orchestrator) {
                return;
            }
        }
    })
}

/// A waiting prompt takes the interrupt. Otherwise the crew shuts down.
/// Returns whether to keep watching.
fn on_interrupt(interrupts: &InterruptRouter, orchestrator: &WorkflowOrchestrator) -> bool {
    if interrupts.deliver() {
        return true;
    }
    eprintln!("  {} Interrupted, cancelling running workflows", "⚠".yellow());
    orchestrator.shutdown();
    false
}

fn print_header(crew: &Crew) {
    let project = &crew.loaded.settings.project;
    println!();
    println!(
        "  {} pmcrew v{}",
        "⚙".to_string().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("  Project:    {}", project.name.cyan());
    println!("  Repository: {}", project.repository_or_unknown().cyan());
    if let Some(sprint) = &project.current_sprint {
        println!("  Sprint:     {}", sprint.cyan());
    }
    if let Some(source) = &crew.loaded.source {
        println!("  Config:     {}", source.display().to_string().dimmed());
    }
    println!();
}

fn print_batch(batch: &BatchReport, crew: &Crew) {
    println!();
    for report in &batch.workflows {
        println!("  {}", format_report(report));
    }

    let summary = crew.orchestrator.summary();
    println!();
    println!(
        "  {} {}",
        "─".repeat(40).dimmed(),
        summary.one_line().dimmed()
    );
    if let Some(path) = &crew.journal_path {
        println!("  Journal: {}", path.display().to_string().dimmed());
    }

    println!();
    if batch.overall_success {
        println!("  {} All workflows succeeded", "✓".green().bold());
    } else {
        let failed = batch.workflows.iter().filter(|w| !w.success).count();
        println!(
            "  {} {} of {} workflows did not succeed",
            "✗".red().bold(),
            failed,
            batch.workflows.len()
        );
    }
    println!();
}

/// One line per workflow: icon, name, state, then the detail.
pub fn format_report(report: &WorkflowReport) -> String {
    let icon = if report.success {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    let detail = report.detail();
    let first_line = detail.lines().next().unwrap_or_default();
    format!(
        "{} {:<11} {:<10} {}",
        icon,
        report.workflow.to_string().bold(),
        report.state.to_string().dimmed(),
        first_line
    )
}
