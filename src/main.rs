//! pmcrew — human-gated project management agents.
//!
//! Quick start:
//!   pmcrew init                        # write .pmcrew.yaml
//!   pmcrew run-all --brief "..."       # plan, standup and monitor
//!   pmcrew history                     # what was approved, and by whom
//!
//! For more info: pmcrew --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use pmcrew::cli::{self, ApprovalMode, GlobalOptions};
use pmcrew::workflow::WorkflowRequest;
use std::path::PathBuf;

/// pmcrew — project management agents that ask before they act.
#[derive(Parser)]
#[command(
    name = "pmcrew",
    version,
    about = "Project management agents that ask before they act",
    long_about = "pmcrew runs planning, standup and monitoring workflows through\n\
                  agent commands, and asks you to approve every action first.\n\n\
                  Quick start:\n  \
                  pmcrew init                    # write a starter config\n  \
                  pmcrew run-all --brief \"...\"   # run every workflow\n  \
                  pmcrew history                 # see what was decided"
)]
struct Cli {
    /// Config file (default: .pmcrew.yaml found walking up from here)
    #[arg(long, global = true, env = "PMCREW_CONFIG")]
    config: Option<PathBuf>,

    /// Who answers approval prompts
    #[arg(long, global = true, value_enum, default_value_t = ApprovalMode::Terminal)]
    approval: ApprovalMode,

    /// Print machine-readable JSON instead of styled output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter .pmcrew.yaml
    Init {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Plan and break down a project or feature
    Plan {
        /// What to plan
        brief: String,
    },

    /// Generate and post the daily standup report
    Standup,

    /// Scan the repository for risks, issues and CI status
    Monitor,

    /// Planning (with --brief), then standup and monitoring
    RunAll {
        #[arg(short, long)]
        brief: Option<String>,
    },

    /// Interactive session: run workflows one command at a time
    Shell,

    /// Handle a webhook event
    Webhook {
        /// Event type, e.g. issues, pull_request, workflow_run
        event_type: String,
        /// JSON payload file, or - for stdin
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },

    /// Show recorded approval decisions
    History {
        #[arg(short, long, help = "Session ID to view")]
        session: Option<String>,
        #[arg(short, long, help = "Max entries to show")]
        limit: Option<usize>,
        #[arg(long, help = "Show only the summary")]
        summary: bool,
        #[arg(long, help = "List all recorded sessions")]
        list: bool,
    },

    /// Show the crew: project, agents, approval settings
    Status,

    /// Print the effective configuration
    Config,
}

/// Exit status for a workflow run that finished but did not succeed.
const EXIT_UNSUCCESSFUL: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pmcrew=warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        approval: cli.approval,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Init { output, force } => cli::init::run_init(output.as_deref(), force).map(|_| true),

        Commands::Plan { brief } => {
            cli::run::run_workflows(&options, vec![WorkflowRequest::Planning { brief }]).await
        }

        Commands::Standup => cli::run::run_workflows(&options, vec![WorkflowRequest::Standup]).await,

        Commands::Monitor => {
            cli::run::run_workflows(&options, vec![WorkflowRequest::Monitoring]).await
        }

        Commands::RunAll { brief } => cli::run::run_full(&options, brief).await,

        Commands::Shell => cli::shell::run_shell(&options).await,

        Commands::Webhook {
            event_type,
            payload,
        } => match cli::run::read_payload(payload.as_deref()) {
            Ok(payload) => {
                cli::run::run_workflows(
                    &options,
                    vec![WorkflowRequest::Webhook {
                        event_type,
                        payload,
                    }],
                )
                .await
            }
            Err(e) => Err(e),
        },

        Commands::History {
            session,
            limit,
            summary,
            list,
        } => cli::history::run_history(
            &options,
            &cli::history::HistoryOptions {
                session,
                limit,
                summary_only: summary,
                list,
            },
        )
        .map(|_| true),

        Commands::Status => cli::status::run_status(&options).map(|_| true),

        Commands::Config => cli::status::run_config(&options).map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_UNSUCCESSFUL),
        Err(e) => {
            eprintln!();
            eprintln!("  {} {}", "✗".red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  {} {}", "caused by:".dimmed(), cause);
            }
            eprintln!();
            std::process::exit(1);
        }
    }
}
