//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("lazydispatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("workflow"))
        .stdout(predicate::str::contains("chain"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_version() {
    Command::cargo_bin("lazydispatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lazydispatch"));
}

#[test]
fn test_invalid_repo_is_a_fatal_startup_error() {
    Command::cargo_bin("lazydispatch")
        .unwrap()
        .args(["--repo", "no-slash-here", "workflow", "list"])
        .current_dir(std::env::temp_dir())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("owner/repo"));
}

#[test]
fn test_outside_git_repo_without_override_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("lazydispatch")
        .unwrap()
        .args(["chain", "list"])
        .current_dir(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("git repository"));
}
