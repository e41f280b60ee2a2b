use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const PATCH_COMMENT: &str =
    "Please apply:\n\n```diff\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-old\n+new\n```\n";

fn git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo() -> TempDir {
    let dir = tempdir().unwrap();
    let w = dir.path();
    git(w, &["init", "-b", "main"]);
    git(w, &["config", "user.name", "fencepatch-test"]);
    git(w, &["config", "user.email", "fencepatch-test@example.com"]);
    git(w, &["config", "commit.gpgsign", "false"]);
    std::fs::write(w.join("f"), "old\n").unwrap();
    git(w, &["add", "--all"]);
    git(w, &["commit", "-m", "initial commit"]);
    dir
}

/// The binary with config isolated to `home`, run from `cwd`.
fn fencepatch(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fencepatch").unwrap();
    cmd.env("XDG_CONFIG_HOME", home)
        .env("RUST_LOG", "off")
        .current_dir(cwd);
    cmd
}

#[test]
fn extract_prints_candidates_as_json() {
    let home = tempdir().unwrap();
    let output = fencepatch(home.path(), home.path())
        .arg("extract")
        .write_stdin(PATCH_COMMENT)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let candidates = json.as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["index"], 0);
    assert!(candidates[0]["body"].as_str().unwrap().contains("+new"));
}

#[test]
fn extract_without_patches_prints_empty_list() {
    let home = tempdir().unwrap();
    fencepatch(home.path(), home.path())
        .arg("extract")
        .write_stdin("```rust\nfn main() {}\n```\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn apply_commits_locally_with_no_push() {
    let home = tempdir().unwrap();
    let repo = init_repo();
    let comment = home.path().join("comment.md");
    std::fs::write(&comment, PATCH_COMMENT).unwrap();

    fencepatch(home.path(), repo.path())
        .args(["apply", "--no-push", "--input"])
        .arg(&comment)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 1 of 1 patch."))
        .stdout(predicate::str::contains("pushing is disabled"));

    assert_eq!(std::fs::read_to_string(repo.path().join("f")).unwrap(), "new\n");
}

#[test]
fn apply_json_summary() {
    let home = tempdir().unwrap();
    let repo = init_repo();

    let output = fencepatch(home.path(), repo.path())
        .args(["apply", "--no-push", "--json", "--tree"])
        .arg(repo.path())
        .write_stdin(PATCH_COMMENT)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["kind"], "applied");
    assert_eq!(json["result"]["applied_count"], 1);
    assert_eq!(json["result"]["push"]["status"], "disabled");
}

#[test]
fn apply_to_missing_tree_fails() {
    let home = tempdir().unwrap();
    fencepatch(home.path(), home.path())
        .args(["apply", "--no-push", "--tree", "does-not-exist"])
        .write_stdin(PATCH_COMMENT)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn apply_without_patches_succeeds() {
    let home = tempdir().unwrap();
    let repo = init_repo();
    fencepatch(home.path(), repo.path())
        .args(["apply", "--no-push"])
        .write_stdin("Looks good to me")
        .assert()
        .success()
        .stdout(predicate::str::contains("No applicable patches"));
}

#[test]
fn handle_ignores_unrelated_events() {
    let home = tempdir().unwrap();
    let event = home.path().join("event.json");
    std::fs::write(&event, r#"{"ref": "refs/heads/main"}"#).unwrap();

    fencepatch(home.path(), home.path())
        .args(["handle", "--event-name", "push", "--event"])
        .arg(&event)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn handle_dry_run_prints_report() {
    let home = tempdir().unwrap();
    let repo = init_repo();
    let event = home.path().join("event.json");
    let payload = serde_json::json!({
        "action": "created",
        "comment": { "body": PATCH_COMMENT, "user": { "login": "coderabbitai[bot]" } },
        "issue": { "number": 4, "pull_request": {} },
        "repository": { "full_name": "owner/repo" }
    });
    std::fs::write(&event, payload.to_string()).unwrap();

    fencepatch(home.path(), repo.path())
        .args(["handle", "--dry-run", "--event-name", "issue_comment", "--event"])
        .arg(&event)
        .assert()
        .success()
        .stdout(predicate::str::contains("### fencepatch"))
        .stdout(predicate::str::contains("| #1 | `f` | applied |"));
}

#[test]
fn handle_rejects_malformed_payload() {
    let home = tempdir().unwrap();
    let event = home.path().join("event.json");
    std::fs::write(&event, "{").unwrap();

    fencepatch(home.path(), home.path())
        .args(["handle", "--event-name", "issue_comment", "--event"])
        .arg(&event)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid issue_comment payload"));
}

#[test]
fn init_local_writes_project_config() {
    let home = tempdir().unwrap();
    let repo = init_repo();

    fencepatch(home.path(), repo.path())
        .args(["init", "--local"])
        .assert()
        .success();
    assert!(repo.path().join(".fencepatch.toml").exists());
}
