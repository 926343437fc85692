//! Tool and repository configuration.
//!
//! Configuration is loaded from `$HOME/.stackpr.yml` and then overridden by
//! `<repo-root>/.stackpr.yml` when present, the same two-layer precedence
//! the teacher's `spr-multicommit` config used.

use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::gitops::GitOps;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    /// GitHub username used in tracking branch names (`gh/<user>/<N>/*`).
    pub user: Option<String>,
    /// Host for GitHub Enterprise deployments; defaults to `github.com`.
    pub github_url: Option<String>,
    /// Git remote to fetch/push tracking branches against; defaults to `origin`.
    pub remote_name: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub user: String,
    pub github_url: String,
    pub remote_name: String,
    pub repo_owner: String,
    pub repo_name: String,
}

fn read_config_file(path: &PathBuf) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let cfg: FileConfig = serde_yaml::from_str(&content)?;
    Ok(Some(cfg))
}

fn apply_overrides(base: FileConfig, overrides: FileConfig) -> FileConfig {
    FileConfig {
        user: overrides.user.or(base.user),
        github_url: overrides.github_url.or(base.github_url),
        remote_name: overrides.remote_name.or(base.remote_name),
        repo_owner: overrides.repo_owner.or(base.repo_owner),
        repo_name: overrides.repo_name.or(base.repo_name),
    }
}

/// Load config from `$HOME` then the repo root, then fill anything still
/// missing from `git` itself (current user, remote URL).
pub fn load_config(git: &dyn GitOps) -> Result<Config> {
    let mut merged = FileConfig::default();

    if let Some(home) = std::env::var_os("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".stackpr.yml");
        if let Some(home_cfg) = read_config_file(&p)? {
            merged = apply_overrides(merged, home_cfg);
        }
    }

    if let Ok(Some(root)) = git.repo_root() {
        let mut p = PathBuf::from(root);
        p.push(".stackpr.yml");
        if let Some(repo_cfg) = read_config_file(&p)? {
            merged = apply_overrides(merged, repo_cfg);
        }
    }

    let (discovered_owner, discovered_name) = git.remote_owner_and_name("origin").unwrap_or_default();

    let user = merged
        .user
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "user".to_string());

    Ok(Config {
        user,
        github_url: merged.github_url.unwrap_or_else(|| "github.com".to_string()),
        remote_name: merged.remote_name.unwrap_or_else(|| "origin".to_string()),
        repo_owner: merged.repo_owner.unwrap_or(discovered_owner),
        repo_name: merged.repo_name.unwrap_or(discovered_name),
    })
}
