//! End-to-end CLI tests
//!
//! These only exercise paths that are safe everywhere: argument handling,
//! listing, and failures that occur before any device is touched. Writing to
//! real media is covered by the core integration suite against loopback
//! files.

use assert_cmd::Command;
use predicates::prelude::*;

fn burnish() -> Command {
    Command::cargo_bin("burnish").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    burnish()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("write"))
        .stdout(predicate::str::contains("read"));
}

#[test]
fn test_version_flag() {
    burnish()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("burnish"));
}

#[test]
fn test_no_subcommand_is_a_usage_error() {
    burnish().assert().failure().code(2);
}

#[test]
fn test_list_always_succeeds() {
    // Enumeration failures degrade to an empty snapshot, never an error.
    burnish().arg("list").assert().success();
}

#[test]
fn test_list_json_is_machine_readable() {
    burnish()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["));
}

#[test]
fn test_write_requires_an_image_argument() {
    burnish().arg("write").assert().failure().code(2);
}

#[test]
fn test_write_missing_image_fails_before_touching_devices() {
    burnish()
        .args([
            "write",
            "/definitely/not/here.iso",
            "--device",
            "disk99s9",
            "--yes",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_write_rejects_directory_as_image() {
    let dir = tempfile::tempdir().unwrap();
    burnish()
        .args(["write", dir.path().to_str().unwrap(), "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a file"));
}

#[test]
fn test_read_with_yes_needs_an_explicit_device() {
    // Either no devices exist (CI) or an explicit --device is demanded;
    // both abort before anything is read.
    burnish()
        .args(["read", "/tmp/burnish-test-capture.iso", "--yes"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_block_size_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("image.iso");
    std::fs::write(&image, vec![0u8; 1024]).unwrap();

    burnish()
        .args([
            "write",
            image.to_str().unwrap(),
            "--device",
            "disk99s9",
            "--yes",
            "--block-size",
            "nope",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("block size"));
}
