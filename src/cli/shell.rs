//! `pmcrew shell`: run workflows from one long-lived session.
//!
//! The crew, its ledger and the session override survive between commands,
//! so "skip rest" in one command also covers the next. Lines are read through
//! the same stdin reader the approval prompts use.

use crate::approval::ApproverError;
use crate::cli::history::format_entry;
use crate::cli::run::{build_crew, format_report, spawn_interrupt_watcher, Crew};
use crate::cli::GlobalOptions;
use crate::workflow::{BatchReport, WorkflowRequest};
use anyhow::Result;
use colored::Colorize;

const PROMPT: &str = "pmcrew> ";

#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Plan(String),
    Standup,
    Monitor,
    RunAll(Option<String>),
    Status,
    History,
    Help,
    Exit,
    Nothing,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "" => Ok(ShellCommand::Nothing),
        "plan" if rest.is_empty() => Err("usage: plan <brief>".to_string()),
        "plan" => Ok(ShellCommand::Plan(rest.to_string())),
        "standup" => Ok(ShellCommand::Standup),
        "monitor" => Ok(ShellCommand::Monitor),
        "run-all" | "all" => Ok(ShellCommand::RunAll(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "status" => Ok(ShellCommand::Status),
        "history" | "summary" => Ok(ShellCommand::History),
        "help" | "?" => Ok(ShellCommand::Help),
        "exit" | "quit" => Ok(ShellCommand::Exit),
        other => Err(format!("unknown command '{}', type 'help'", other)),
    }
}

/// Returns whether every workflow run in the session succeeded.
pub async fn run_shell(options: &GlobalOptions) -> Result<bool> {
    let crew = build_crew(options, true)?;
    let watcher = spawn_interrupt_watcher(crew.interrupts.clone(), crew.orchestrator.clone());

    println!();
    println!(
        "  {} pmcrew shell  {}",
        "⚙".to_string().bold(),
        crew.loaded.settings.project.name.cyan()
    );
    println!("  {}", "Type 'help' for commands, 'exit' to leave.".dimmed());
    println!();

    let result = shell_loop(&crew).await;
    watcher.abort();

    println!("  {}", crew.orchestrator.summary().one_line().dimmed());
    if let Some(path) = &crew.journal_path {
        println!("  Journal: {}", path.display().to_string().dimmed());
    }
    println!();
    result
}

async fn shell_loop(crew: &Crew) -> Result<bool> {
    let orchestrator = &crew.orchestrator;
    let mut all_succeeded = true;

    loop {
        let line = match crew.terminal.read_line(PROMPT).await {
            Ok(line) => line,
            Err(ApproverError::Interrupted) => continue,
            Err(ApproverError::Closed) => {
                println!();
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let batch = match parse_command(&line) {
            Ok(ShellCommand::Nothing) => continue,
            Ok(ShellCommand::Exit) => break,
            Ok(ShellCommand::Help) => {
                print_help();
                continue;
            }
            Ok(ShellCommand::Status) => {
                print_status(crew);
                continue;
            }
            Ok(ShellCommand::History) => {
                print_history(crew);
                continue;
            }
            Ok(ShellCommand::Plan(brief)) => {
                orchestrator
                    .run_batch(vec![WorkflowRequest::Planning { brief }])
                    .await
            }
            Ok(ShellCommand::Standup) => orchestrator.run_batch(vec![WorkflowRequest::Standup]).await,
            Ok(ShellCommand::Monitor) => {
                orchestrator.run_batch(vec![WorkflowRequest::Monitoring]).await
            }
            Ok(ShellCommand::RunAll(brief)) => orchestrator.run_full(brief.as_deref()).await,
            Err(message) => {
                println!("  {} {}", "?".yellow(), message);
                continue;
            }
        };

        all_succeeded &= batch.overall_success;
        print_reports(&batch);

        if orchestrator.is_shut_down() {
            println!("  {} Crew shut down, leaving the shell", "⚠".yellow());
            break;
        }
    }

    Ok(all_succeeded)
}

fn print_reports(batch: &BatchReport) {
    println!();
    for report in &batch.workflows {
        println!("  {}", format_report(report));
    }
    println!();
}

fn print_status(crew: &Crew) {
    let status = crew.orchestrator.status();
    let config = &status.configuration;
    println!();
    println!("  Project:   {}", crew.loaded.settings.project.name.cyan());
    println!(
        "  Approval:  required {}, auto low risk {}, timeout {}s",
        config.human_approval_required, config.auto_approve_low_risk, config.approval_timeout_secs
    );
    if status.session.override_active {
        println!("  Session:   {}", "skipping approvals".yellow());
    }
    println!(
        "  Ledger:    {} pending, {} recorded",
        status.pending, status.interactions
    );
    println!();
}

fn print_history(crew: &Crew) {
    let entries = crew.orchestrator.ledger().entries();
    println!();
    if entries.is_empty() {
        println!("  {}", "No decisions yet.".dimmed());
    }
    for entry in &entries {
        println!("  {}", format_entry(entry));
    }
    println!();
    println!("  {}", crew.orchestrator.summary().one_line().dimmed());
    println!();
}

fn print_help() {
    println!();
    println!("  {}", "Commands".bold());
    for (usage, what) in [
        ("plan <brief>", "plan and break down a project or feature"),
        ("standup", "generate and post the daily standup"),
        ("monitor", "scan for risks, issues and CI status"),
        ("run-all [brief]", "planning (with a brief), standup, monitoring"),
        ("status", "approval settings and session state"),
        ("history", "decisions recorded in this session"),
        ("exit", "leave the shell"),
    ] {
        println!("    {:<18}{}", usage, what.dimmed());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workflow_commands() {
        assert_eq!(
            parse_command("plan  Add search to docs "),
            Ok(ShellCommand::Plan("Add search to docs".to_string()))
        );
        assert_eq!(parse_command("STANDUP"), Ok(ShellCommand::Standup));
        assert_eq!(parse_command("monitor"), Ok(ShellCommand::Monitor));
        assert_eq!(parse_command("run-all"), Ok(ShellCommand::RunAll(None)));
        assert_eq!(
            parse_command("all v2 launch"),
            Ok(ShellCommand::RunAll(Some("v2 launch".to_string())))
        );
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(parse_command("   "), Ok(ShellCommand::Nothing));
        assert_eq!(parse_command("summary"), Ok(ShellCommand::History));
        assert_eq!(parse_command("quit"), Ok(ShellCommand::Exit));
        assert_eq!(parse_command("?"), Ok(ShellCommand::Help));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("plan").unwrap_err().contains("usage"));
        assert!(parse_command("deploy now").unwrap_err().contains("unknown command 'deploy'"));
    }
}
