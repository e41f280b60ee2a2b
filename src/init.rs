use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use xdg::BaseDirectories;

use crate::config::{find_project_root, LOCAL_CONFIG_FILE};

/// Default config.toml content
const DEFAULT_CONFIG: &str = r#"# fencepatch configuration.
# Every key is optional; the values below are the defaults.

[bot]
# Comments whose author contains this (case-insensitive) are processed even
# without a ```diff block marker.
name = "coderabbit"

[apply]
# Try `git apply --reject` after a patch fails, keeping whatever hunks fit.
reject_mode = true
# Leave *.rej files in the working tree (they are never committed).
keep_reject_files = false
# Extra arguments for every `git apply`, e.g. ["--recount", "--whitespace=fix"]
extra_args = []
# {applied}, {failed} and {total} are substituted.
commit_message = "Apply {applied} patch(es) from PR comment ({failed} failed)"

[git]
remote = "origin"
push = true

[rerun]
# Workflow to dispatch on the PR branch after a successful push.
# workflow = "ci.yml"
"#;

/// Default local .fencepatch.toml content
const DEFAULT_LOCAL_CONFIG: &str = r#"# Project-local fencepatch configuration.
# Values here override the global config (~/.config/fencepatch/config.toml).
# Only specify values you want to override.

# [apply]
# extra_args = ["--recount"]

# [git]
# push = false
"#;

/// Run the init command
pub fn run_init(force: bool, local: bool) -> Result<()> {
    if local {
        let path = find_project_root().join(LOCAL_CONFIG_FILE);
        write_file_if_needed(&path, DEFAULT_LOCAL_CONFIG, force)?;
        println!("Tip: commit {} to share settings with your team.", LOCAL_CONFIG_FILE);
        return Ok(());
    }

    let base_dirs =
        BaseDirectories::with_prefix("fencepatch").context("Failed to get config directory")?;
    let config_home = base_dirs.get_config_home();
    if !config_home.exists() {
        println!(
            "Creating configuration directory: {}",
            config_home.display()
        );
        fs::create_dir_all(&config_home).context("Failed to create config directory")?;
    }

    write_file_if_needed(&config_home.join("config.toml"), DEFAULT_CONFIG, force)
}

/// Write a file if it doesn't exist or force is true
fn write_file_if_needed(path: &Path, content: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "Skipping {} (already exists, use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }

    println!("Writing {}...", path.display());
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
