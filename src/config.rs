use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

use crate::apply::DEFAULT_COMMIT_MESSAGE;

/// Project-local override file, looked up from the current directory upwards
pub const LOCAL_CONFIG_FILE: &str = ".fencepatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub apply: ApplyConfig,
    pub git: GitConfig,
    pub rerun: RerunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Case-insensitive substring of the comment author that marks a patch bot
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub reject_mode: bool,
    pub keep_reject_files: bool,
    pub extra_args: Vec<String>,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub remote: String,
    pub push: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerunConfig {
    /// Workflow to dispatch after a successful push; empty disables
    pub workflow: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "coderabbit".to_owned(),
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            reject_mode: true,
            keep_reject_files: false,
            extra_args: Vec::new(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_owned(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_owned(),
            push: true,
        }
    }
}

impl Config {
    /// Global config, then the project-local file on top of it.
    pub fn load() -> Result<Self> {
        let global = global_config_path();
        let local = find_project_root().join(LOCAL_CONFIG_FILE);
        Self::load_from(global.as_deref(), Some(&local))
    }

    /// Load and merge explicit config files. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in [global, local].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let table: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            merge_tables(&mut merged, table);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")
    }
}

/// Overlay `overlay` onto `base`, recursing into sub-tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// ~/.config/fencepatch/config.toml
pub fn global_config_path() -> Option<PathBuf> {
    BaseDirectories::with_prefix("fencepatch")
        .ok()
        .map(|dirs| dirs.get_config_home().join("config.toml"))
}

/// Nearest ancestor of the current directory containing `.git`, else the
/// current directory itself.
pub fn find_project_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root_from(&cwd)
}

fn find_project_root_from(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}
