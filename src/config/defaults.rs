//! The configuration template written by `pmcrew init`.

pub const CONFIG_FILE_NAME: &str = ".pmcrew.yaml";

/// Commented starter configuration. Every value shown is the built-in default
/// unless noted otherwise.
pub const DEFAULT_CONFIG_YAML: &str = r##"# pmcrew configuration
# Human-gated project management agents.

project:
  name: "My Project"
  description: ""
  # owner/repo of the repository the crew works on
  # repository: acme/widgets
  # current_sprint: "Sprint 1"
  team_members: []
  channel: "#pm-updates"
  # board_id: PVT_xxx
  ci_enabled: true

approval:
  # Ask a human before any action runs
  human_approval_required: true
  # With approval not required, also skip the prompt for LOW risk actions
  auto_approve_low_risk: false
  # Seconds a request may wait for an answer before it times out
  timeout_secs: 300

risk:
  # Glob patterns over action types
  medium_actions: [delete_issue, close_issue, merge_pull_request]
  high_actions: [trigger_workflow, update_project_item_status]
  # Parameters containing this word (any case) are CRITICAL
  critical_marker: critical

# Each capability runs a command with the task on stdin and the context as
# JSON in $PMCREW_CONTEXT. Without a command it is a dry run.
#
#   planning:
#     command: ./agents/plan.sh
#     workdir: .
capabilities:
  planning: {}
  reporting: {}
  monitoring: {}

orchestrator:
  # Run the workflows of `run-all` at the same time
  concurrent: false

ledger:
  # Mirror every approval decision to ~/.pmcrew/ledger/<session>.jsonl
  journal: true
  # directory: ~/.pmcrew/ledger
  recent_limit: 5
"##;
