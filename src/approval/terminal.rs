//! Terminal approver using crossterm.
//!
//! Draws the approval panel for a request and reads line-based answers from
//! stdin. Ctrl-C at any prompt interrupts the request (the gate records it
//! as rejected) instead of killing the process mid-decision. With an
//! [`InterruptRouter`] attached, Ctrl-C arrives through the router and the
//! signal itself is left to whoever owns it.

use crate::approval::interrupt::InterruptRouter;
use crate::approval::params::{ActionParams, ParamValue};
use crate::approval::types::{ApproverChoice, Presentation};
use crate::approval::{Approver, ApproverError};
use crate::risk::RiskLevel;
use async_trait::async_trait;
use crossterm::{
    execute,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use similar::{ChangeTag, TextDiff};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

const PANEL_WIDTH: usize = 58;

/// Interactive approver on the controlling terminal.
pub struct TerminalApprover {
    input: Mutex<Lines<BufReader<Stdin>>>,
    interrupts: Option<InterruptRouter>,
}

impl TerminalApprover {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            interrupts: None,
        }
    }

    /// Take interrupts from `router` instead of listening for Ctrl-C directly.
    pub fn with_interrupts(mut self, router: InterruptRouter) -> Self {
        self.interrupts = Some(router);
        self
    }

    /// Print a prompt and wait for one line, sharing stdin with the approval prompts.
    pub async fn read_line(&self, prompt: &str) -> Result<String, ApproverError> {
        self.ask(prompt).await
    }

    async fn ask(&self, prompt: &str) -> Result<String, ApproverError> {
        let mut stdout = std::io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print(prompt),
            ResetColor
        )?;
        stdout.flush()?;

        let mut input = self.input.lock().await;
        let line = match &self.interrupts {
            Some(router) => {
                let mut listener = router.listen();
                tokio::select! {
                    _ = listener.interrupted() => None,
                    line = input.next_line() => Some(line),
                }
            }
            None => tokio::select! {
                _ = tokio::signal::ctrl_c() => None,
                line = input.next_line() => Some(line),
            },
        };

        match line {
            None => {
                execute!(stdout, Print("\n"))?;
                Err(ApproverError::Interrupted)
            }
            Some(line) => match line? {
                Some(line) => Ok(line.trim().to_string()),
                None => Err(ApproverError::Closed),
            },
        }
    }
}

impl Default for TerminalApprover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn present(&self, view: &Presentation<'_>) -> Result<(), ApproverError> {
        let request = view.request;
        let color = risk_color(request.risk_level);
        let mut stdout = std::io::stdout();

        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(color),
            Print(format!("╔{}╗\n", "═".repeat(PANEL_WIDTH))),
            Print(format!("║{:^width$}║\n", "HUMAN APPROVAL REQUIRED", width = PANEL_WIDTH)),
            Print(format!("╠{}╣\n", "═".repeat(PANEL_WIDTH))),
            ResetColor,
        )?;

        panel_row(&mut stdout, "Action", &request.action_type, Color::White)?;
        panel_row(
            &mut stdout,
            "Risk",
            &request.risk_level.to_string().to_uppercase(),
            color,
        )?;
        panel_row(&mut stdout, "Timeout", &format_duration(view.timeout_remaining), Color::White)?;
        for line in wrap(&request.description, PANEL_WIDTH - 14) {
            panel_row(&mut stdout, "", &line, Color::Grey)?;
        }

        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("╟{}╢\n", "─".repeat(PANEL_WIDTH))),
            ResetColor,
        )?;
        if request.proposed_action().is_empty() {
            panel_row(&mut stdout, "", "(no parameters)", Color::DarkGrey)?;
        }
        for (key, value) in request.proposed_action().iter() {
            for (i, line) in render_value(value).lines().take(6).enumerate() {
                let label = if i == 0 { key } else { "" };
                panel_row(&mut stdout, label, line, Color::White)?;
            }
        }

        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("╟{}╢\n", "─".repeat(PANEL_WIDTH))),
            ResetColor,
            SetForegroundColor(Color::Green),
            Print("  [A] Approve  "),
            SetForegroundColor(Color::Red),
            Print("[R] Reject  "),
            SetForegroundColor(Color::Yellow),
            Print("[M] Modify  "),
            SetForegroundColor(Color::Blue),
            Print("[I] Info  "),
            SetForegroundColor(Color::Magenta),
            Print("[S] Skip rest\n"),
            SetForegroundColor(color),
            Print(format!("╚{}╝\n", "═".repeat(PANEL_WIDTH))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    async fn choose(&self, _view: &Presentation<'_>) -> Result<ApproverChoice, ApproverError> {
        loop {
            let answer = self.ask("What would you like to do? [a/r/m/i/s] (a): ").await?;
            match ApproverChoice::from_str_loose(&answer) {
                Some(ApproverChoice::Reject { .. }) => {
                    let reason = self.ask("Reason for rejection (optional): ").await?;
                    let reason = (!reason.is_empty()).then_some(reason);
                    return Ok(ApproverChoice::Reject { reason });
                }
                Some(choice) => return Ok(choice),
                None => self.notify("Please answer a, r, m, i or s").await,
            }
        }
    }

    async fn read_edit(
        &self,
        original: &ActionParams,
        working: &ActionParams,
    ) -> Result<String, ApproverError> {
        let mut stdout = std::io::stdout();

        if original == working {
            execute!(
                stdout,
                SetAttribute(Attribute::Bold),
                Print("\nCurrent parameters:\n"),
                SetAttribute(Attribute::Reset),
                Print(indent(&working.to_lines())),
                Print("\n"),
            )?;
        } else {
            execute!(
                stdout,
                SetAttribute(Attribute::Bold),
                Print("\nPending changes:\n"),
                SetAttribute(Attribute::Reset),
            )?;
            let before = original.to_lines();
            let after = working.to_lines();
            for change in TextDiff::from_lines(&before, &after).iter_all_changes() {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("-", Color::Red),
                    ChangeTag::Insert => ("+", Color::Green),
                    ChangeTag::Equal => (" ", Color::DarkGrey),
                };
                execute!(
                    stdout,
                    SetForegroundColor(color),
                    Print(format!("  {} {}", sign, change.value().trim_end())),
                    Print("\n"),
                    ResetColor,
                )?;
            }
        }

        execute!(
            stdout,
            SetForegroundColor(Color::DarkGrey),
            Print("  key=value to set (JSON values are parsed), 'done' to apply, 'cancel' to discard\n"),
            ResetColor,
        )?;
        self.ask("Modification: ").await
    }

    async fn show_info(&self, view: &Presentation<'_>) -> Result<(), ApproverError> {
        let request = view.request;
        let mut stdout = std::io::stdout();

        let mut rows = vec![
            ("Request ID".to_string(), request.id.to_string()),
            (
                "Created".to_string(),
                request.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            ("Timeout".to_string(), format_duration(request.timeout)),
            ("Time remaining".to_string(), format_duration(view.timeout_remaining)),
        ];
        rows.extend(view.details.iter().cloned());

        execute!(
            stdout,
            SetAttribute(Attribute::Bold),
            Print("\nRequest information\n"),
            SetAttribute(Attribute::Reset),
        )?;
        for (label, value) in &rows {
            execute!(
                stdout,
                SetForegroundColor(Color::Blue),
                Print(format!("  {:<16}", label)),
                ResetColor,
                Print(format!("{}\n", value)),
            )?;
        }

        if !request.context.is_empty() {
            let context = serde_json::to_string_pretty(&request.context)
                .unwrap_or_else(|_| "(unprintable context)".to_string());
            execute!(
                stdout,
                SetAttribute(Attribute::Bold),
                Print("\nContext\n"),
                SetAttribute(Attribute::Reset),
                SetForegroundColor(Color::DarkGrey),
                Print(indent(&context)),
                Print("\n"),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    async fn notify(&self, message: &str) {
        let mut stdout = std::io::stdout();
        let _ = execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print(format!("  {}\n", message)),
            ResetColor,
        );
    }
}

fn risk_color(risk: RiskLevel) -> Color {
    match risk {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::DarkYellow,
        RiskLevel::Critical => Color::Red,
    }
}

fn panel_row(
    stdout: &mut std::io::Stdout,
    label: &str,
    value: &str,
    color: Color,
) -> std::io::Result<()> {
    let label = if label.is_empty() {
        String::new()
    } else {
        format!("{}:", label)
    };
    execute!(
        stdout,
        Print(format!("║  {:<12}", truncate(&label, 12))),
        SetForegroundColor(color),
        Print(format!("{:<width$}", truncate(value, PANEL_WIDTH - 14), width = PANEL_WIDTH - 14)),
        ResetColor,
        Print("║\n"),
    )
}

/// Structured values are pretty-printed, everything else as-is.
fn render_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Structured(v) => {
            serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
        }
        other => other.to_string(),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("  {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
