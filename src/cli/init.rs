//! `pmcrew init` — write a starter `.pmcrew.yaml`.
//!
//! The project name is taken from the directory name, and the repository from
//! the `origin` remote when the directory is a git checkout.

use crate::config::defaults::{CONFIG_FILE_NAME, DEFAULT_CONFIG_YAML};
use crate::config::parse_settings_str;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

pub fn run_init(output_path: Option<&Path>, force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let output_file = output_path
        .map(PathBuf::from)
        .unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME));

    if output_file.exists() && !force {
        println!(
            "{} A config file already exists at {}",
            "⚠".yellow(),
            output_file.display()
        );
        println!("  Use --force to overwrite it, or edit it directly.");
        return Ok(());
    }

    let project_dir = output_file.parent().unwrap_or(&cwd);
    let yaml = render_template(project_dir);
    parse_settings_str(&yaml).context("Generated configuration is invalid")?;

    std::fs::write(&output_file, &yaml)
        .with_context(|| format!("Failed to write config file: {}", output_file.display()))?;

    println!();
    println!(
        "  {} Created {}",
        "✓".green().bold(),
        output_file.display().to_string().bold()
    );
    println!();
    println!("  {} Next steps:", "→".blue());
    println!(
        "    1. Set the repository and team: {}",
        format!("$EDITOR {}", output_file.display()).dimmed()
    );
    println!(
        "    2. Point capabilities at your agent commands (dry run until you do)"
    );
    println!("    3. Run the crew: {}", "pmcrew run-all --brief \"...\"".dimmed());
    println!();

    Ok(())
}

/// Fill the template with what can be detected from `dir`.
pub fn render_template(dir: &Path) -> String {
    let mut yaml = DEFAULT_CONFIG_YAML.to_string();

    if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
        let quoted = serde_json::to_string(name).unwrap_or_else(|_| "\"My Project\"".to_string());
        yaml = yaml.replacen("name: \"My Project\"", &format!("name: {}", quoted), 1);
    }

    if let Some(repo) = detect_repository(dir) {
        yaml = yaml.replacen(
            "  # repository: acme/widgets",
            &format!("  repository: {}", repo),
            1,
        );
    }

    yaml
}

/// `owner/repo` of the `origin` remote in `.git/config`, if it is a GitHub-style URL.
fn detect_repository(dir: &Path) -> Option<String> {
    let config = std::fs::read_to_string(dir.join(".git").join("config")).ok()?;
    let mut in_origin = false;
    for line in config.lines().map(str::trim) {
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if !in_origin {
            continue;
        }
        if let Some(url) = line.strip_prefix("url").map(str::trim).and_then(|l| l.strip_prefix('=')) {
            return repository_from_url(url.trim());
        }
    }
    None
}

fn repository_from_url(url: &str) -> Option<String> {
    let path = url
        .strip_suffix(".git")
        .unwrap_or(url)
        .trim_end_matches('/');
    // git@host:owner/repo and https://host/owner/repo
    let path = path.rsplit_once(':').map_or(path, |(_, p)| p);
    let mut parts = path.rsplit('/');
    let repo = parts.next()?;
    let owner = parts.next()?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{}/{}", owner, repo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_repository_from_url() {
        assert_eq!(
            repository_from_url("git@github.com:acme/widgets.git").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(
            repository_from_url("https://github.com/acme/widgets").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(repository_from_url("widgets"), None);
    }

    #[test]
    fn test_template_uses_directory_and_remote() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("widgets");
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        std::fs::write(
            dir.join(".git").join("config"),
            "[core]\n\tbare = false\n[remote \"origin\"]\n\turl = git@github.com:acme/widgets.git\n",
        )
        .unwrap();

        let settings = parse_settings_str(&render_template(&dir)).unwrap();
        assert_eq!(settings.project.name, "widgets");
        assert_eq!(settings.project.repository.as_deref(), Some("acme/widgets"));
    }

    #[test]
    fn test_template_without_git() {
        let tmp = TempDir::new().unwrap();
        let settings = parse_settings_str(&render_template(tmp.path())).unwrap();
        assert!(settings.project.repository.is_none());
    }
}
