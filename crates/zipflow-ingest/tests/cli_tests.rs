//! End-to-end tests for the zipflow binary
//!
//! Every run points the lookup service at a closed port, so only rows that
//! never reach the lookup can succeed or fail deterministically.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn zipflow(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("zipflow").unwrap();
    cmd.current_dir(root)
        .env_remove("ZIPFLOW_WATCH_DIR")
        .env_remove("ZIPFLOW_ARCHIVE_DIR")
        .env_remove("ZIPFLOW_DATABASE_PATH")
        .env_remove("ZIPFLOW_POLL_INTERVAL_SECS")
        .env("ZIPFLOW_TRANSPORT", "console")
        .env("LOG_OUTPUT", "console")
        .args(["--lookup-url", "http://127.0.0.1:1/us"])
        .args(["--database"])
        .arg(root.join("audit.db"));
    cmd
}

#[test]
fn test_once_with_empty_watch_directory() {
    let root = TempDir::new().unwrap();

    zipflow(root.path())
        .arg("--once")
        .arg("--watch-dir")
        .arg(root.path().join("incoming"))
        .arg("--archive-dir")
        .arg(root.path().join("processed"))
        .assert()
        .success();

    // Both directories and the audit database are created on startup
    assert!(root.path().join("incoming").is_dir());
    assert!(root.path().join("processed").is_dir());
    assert!(root.path().join("audit.db").is_file());
}

#[test]
fn test_once_processes_and_archives_file() {
    let root = TempDir::new().unwrap();
    let incoming = root.path().join("incoming");
    std::fs::create_dir(&incoming).unwrap();
    std::fs::write(incoming.join("zips.csv"), "zip,email\n,nobody@example.com\n").unwrap();

    zipflow(root.path())
        .arg("--once")
        .arg("--watch-dir")
        .arg(&incoming)
        .arg("--archive-dir")
        .arg(root.path().join("processed"))
        .assert()
        .success();

    assert!(!incoming.join("zips.csv").exists());
    let archived: Vec<_> = std::fs::read_dir(root.path().join("processed"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].starts_with("zips_") && archived[0].ends_with(".csv"));
}

#[test]
fn test_uncreatable_watch_directory_fails() {
    let root = TempDir::new().unwrap();
    let blocker = root.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();

    zipflow(root.path())
        .arg("--once")
        .arg("--watch-dir")
        .arg(blocker.join("incoming"))
        .arg("--archive-dir")
        .arg(root.path().join("processed"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_same_watch_and_archive_directory_rejected() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("shared");

    zipflow(root.path())
        .arg("--once")
        .arg("--watch-dir")
        .arg(&dir)
        .arg("--archive-dir")
        .arg(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("must differ"));
}

#[test]
fn test_aliased_watch_and_archive_directory_rejected() {
    let root = TempDir::new().unwrap();

    zipflow(root.path())
        .args(["--once", "--watch-dir", "data", "--archive-dir", "./data"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must differ"));

    assert!(!root.path().join("data").exists());
}

#[cfg(unix)]
#[test]
fn test_symlinked_archive_directory_rejected() {
    let root = TempDir::new().unwrap();
    let incoming = root.path().join("incoming");
    std::fs::create_dir(&incoming).unwrap();
    std::fs::write(incoming.join("zips.csv"), "zip,email\n,nobody@example.com\n").unwrap();
    std::os::unix::fs::symlink(&incoming, root.path().join("processed")).unwrap();

    zipflow(root.path())
        .args(["--once", "--watch-dir", "incoming", "--archive-dir", "processed"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must differ"));

    // Nothing was processed, so the file is untouched
    assert!(incoming.join("zips.csv").exists());
}

#[test]
fn test_once_ignores_interval() {
    let root = TempDir::new().unwrap();

    zipflow(root.path())
        .args(["--once", "--interval", "5"])
        .assert()
        .success();

    assert!(root.path().join("incoming").is_dir());
}

#[test]
fn test_bad_log_environment_is_reported() {
    let root = TempDir::new().unwrap();

    zipflow(root.path())
        .env("LOG_LEVEL", "loud")
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("Warning: ignoring logging environment"));
}

#[test]
fn test_help_lists_modes() {
    Command::cargo_bin("zipflow")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--interval"));
}
