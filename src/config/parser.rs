//! YAML configuration loading.
//!
//! Lookup order: `--config` / `PMCREW_CONFIG`, then `.pmcrew.yaml` found by
//! walking up from the current directory, then built-in defaults. Environment
//! overrides are applied last.

use crate::config::defaults::CONFIG_FILE_NAME;
use crate::config::types::Settings;
use crate::risk::RiskClassifier;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub const ENV_APPROVAL_REQUIRED: &str = "PMCREW_APPROVAL_REQUIRED";
pub const ENV_AUTO_APPROVE_LOW_RISK: &str = "PMCREW_AUTO_APPROVE_LOW_RISK";
pub const ENV_APPROVAL_TIMEOUT: &str = "PMCREW_APPROVAL_TIMEOUT";

/// Settings plus the file they came from (if any).
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub source: Option<PathBuf>,
}

/// Resolve, parse, and validate the configuration, then apply env overrides.
pub fn load_settings(explicit: Option<&Path>) -> Result<LoadedSettings> {
    let source = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            find_config_walking_up(&cwd)
        }
    };

    let mut settings = match &source {
        Some(path) => parse_settings_file(path)?,
        None => {
            tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            Settings::default()
        }
    };

    apply_env_overrides(&mut settings)?;
    Ok(LoadedSettings { settings, source })
}

/// Find `.pmcrew.yaml` walking up the directory tree.
pub fn find_config_walking_up(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn parse_settings_file(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_settings_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse and validate a YAML configuration string.
pub fn parse_settings_str(yaml: &str) -> Result<Settings> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in config file")?;

    // A file with nothing but comments is an empty document.
    let settings = if value.is_null() {
        Settings::default()
    } else {
        serde_yaml::from_value(value).context("Invalid configuration")?
    };

    validate(&settings)?;
    Ok(settings)
}

pub fn validate(settings: &Settings) -> Result<()> {
    if let Some(repo) = &settings.project.repository {
        if !is_owner_repo(repo) {
            bail!(
                "project.repository must look like 'owner/repo', got '{}'",
                repo
            );
        }
    }

    if settings.approval.timeout_secs == 0 {
        bail!("approval.timeout_secs must be greater than zero");
    }

    RiskClassifier::new(&settings.risk).context("Invalid glob pattern in risk rules")?;

    for (name, entry) in [
        ("planning", &settings.capabilities.planning),
        ("reporting", &settings.capabilities.reporting),
        ("monitoring", &settings.capabilities.monitoring),
    ] {
        if entry.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            bail!("capabilities.{}.command cannot be empty", name);
        }
    }

    Ok(())
}

fn is_owner_repo(repo: &str) -> bool {
    match repo.split_once('/') {
        Some((owner, name)) => {
            !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !repo.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Apply the `PMCREW_*` environment overrides.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
    apply_overrides_from(settings, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` to read variables.
pub fn apply_overrides_from(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup(ENV_APPROVAL_REQUIRED) {
        settings.approval.human_approval_required = parse_bool(ENV_APPROVAL_REQUIRED, &raw)?;
    }
    if let Some(raw) = lookup(ENV_AUTO_APPROVE_LOW_RISK) {
        settings.approval.auto_approve_low_risk = parse_bool(ENV_AUTO_APPROVE_LOW_RISK, &raw)?;
    }
    if let Some(raw) = lookup(ENV_APPROVAL_TIMEOUT) {
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number of seconds, got '{}'", ENV_APPROVAL_TIMEOUT, raw))?;
        if secs == 0 {
            bail!("{} must be greater than zero", ENV_APPROVAL_TIMEOUT);
        }
        settings.approval.timeout_secs = secs;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be true or false, got '{}'", key, other),
    }
}
