//! Integration tests for the `patchset` binary.
//!
//! Each test runs the real binary inside a fixture project and checks
//! exit codes, printed output and the resulting files.

mod util;

use clap::Parser;
use patchset::cli::{Cli, Commands};
use predicates::prelude::*;
use serde_json::{Value, json};
use assert_cmd::Command;
use util::{changeset, project, read};

fn patchset(dir: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("patchset").expect("patchset binary");
    cmd.current_dir(dir.path()).env_remove("PATCHSET_LOG");
    cmd
}

#[test]
fn apply_flags_parse() {
    // Given
    let argv = vec!["patchset", "--quiet", "apply", "cs.json", "--root", "proj", "--json"];

    // When
    let cli = Cli::parse_from(argv);

    // Then
    assert!(cli.quiet);
    match cli.command {
        Commands::Apply(args) => {
            assert!(args.json);
            assert!(!args.input.from_clipboard);
            assert_eq!(args.input.root.unwrap().to_string_lossy(), "proj");
            assert!(args.input.file.unwrap().ends_with("cs.json"));
        }
        _ => panic!("expected Apply command"),
    }
}

#[test]
fn clipboard_and_file_are_exclusive() {
    let parsed = Cli::try_parse_from(["patchset", "apply", "cs.json", "--from-clipboard"]);
    assert!(parsed.is_err());
}

#[test]
fn apply_writes_files_and_exits_zero() {
    let root = project(&[("notes.txt", "hello world\n")]);
    let raw = changeset(
        "greet",
        json!([{ "path": "notes.txt", "changes": [
            { "change_type": "modifyFile", "oldContent": "hello world", "newContent": "hello patchset" }
        ]}]),
    );

    patchset(&root)
        .args(["--no-color", "apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓"))
        .stdout(predicate::str::contains("programmatically"));

    assert_eq!(read(&root, "notes.txt"), "hello patchset\n");
}

#[test]
fn apply_reads_changeset_from_file_argument() {
    let raw = changeset(
        "new",
        json!([{ "path": "out/new.txt", "changes": [{ "change_type": "createnewFile", "newContent": "fresh" }] }]),
    );
    let root = project(&[("cs.json", raw.as_str())]);

    patchset(&root)
        .args(["--quiet", "apply", "cs.json", "--root", "."])
        .assert()
        .success();

    assert_eq!(read(&root, "out/new.txt"), "fresh");
}

#[test]
fn apply_json_reports_every_operation() {
    let root = project(&[("a.txt", "a")]);
    let raw = changeset(
        "two ops",
        json!([
            { "path": "a.txt", "changes": [{ "change_type": "replaceFile", "newContent": "A" }] },
            { "path": "b.txt", "changes": [{ "change_type": "createnewFile", "newContent": "B" }] }
        ]),
    );

    let output = patchset(&root)
        .args(["apply", "--json", "--root", "."])
        .write_stdin(raw)
        .output()
        .expect("run patchset");

    assert!(output.status.success());
    let v: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(v["description"], "two ops");
    let files = v["files"].as_array().expect("files array");
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f["results"][0]["success"] == true));
}

#[test]
fn dry_run_apply_leaves_files_alone() {
    let root = project(&[("a.txt", "before")]);
    let raw = changeset(
        "noop",
        json!([{ "path": "a.txt", "changes": [{ "change_type": "replaceFile", "newContent": "after" }] }]),
    );

    patchset(&root)
        .args(["--dry-run", "--no-color", "apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));

    assert_eq!(read(&root, "a.txt"), "before");
}

#[test]
fn check_rejects_conflicting_changes_with_exit_three() {
    let root = project(&[("a.txt", "x")]);
    let raw = changeset(
        "conflict",
        json!([{ "path": "a.txt", "changes": [
            { "change_type": "deleteFile" },
            { "change_type": "replaceFile", "newContent": "y" }
        ]}]),
    );

    patchset(&root)
        .args(["check", "--root", "."])
        .write_stdin(raw)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Conflicting"));

    assert_eq!(read(&root, "a.txt"), "x");
}

#[test]
fn escaping_path_is_a_validation_error() {
    let root = project(&[]);
    let raw = changeset(
        "escape",
        json!([{ "path": "../../etc/passwd", "changes": [{ "change_type": "replaceFile", "newContent": "x" }] }]),
    );

    patchset(&root)
        .args(["apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("outside the allowed project root"));
}

#[test]
fn failed_operation_exits_two_and_records_nothing_for_missing_files() {
    let root = project(&[]);
    let raw = changeset(
        "missing",
        json!([{ "path": "absent.rs", "changes": [
            { "change_type": "modifyFile", "oldContent": "a", "newContent": "b" }
        ]}]),
    );

    patchset(&root)
        .args(["--no-color", "apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Failed: File not found."));

    assert!(!root.path().join(".patchset").exists());
}

#[test]
fn ambiguous_edit_without_oracle_is_recorded_and_listed() {
    let root = project(&[("dup.txt", "same\nsame\n")]);
    let raw = changeset(
        "dup",
        json!([{ "path": "dup.txt", "changes": [
            { "change_type": "modifyFile", "oldContent": "same", "newContent": "other" }
        ]}]),
    );

    patchset(&root)
        .args(["--quiet", "apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .code(2);
    assert_eq!(read(&root, "dup.txt"), "same\nsame\n");

    let output = patchset(&root)
        .args(["failures", "--json", "--root", "."])
        .output()
        .expect("run patchset");
    assert!(output.status.success());
    let v: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let items = v.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert!(items[0]["filePath"].as_str().unwrap().ends_with("dup.txt"));
    assert_eq!(items[0]["changes"], 1);

    let record = items[0]["record"].as_str().unwrap().to_string();
    patchset(&root)
        .args(["--dry-run", "replay", record.as_str(), "--root", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would replay 1 modification(s)"));
}

#[test]
fn failures_on_clean_project_is_empty_json() {
    let root = project(&[]);

    patchset(&root)
        .args(["failures", "--json", "--root", "."])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn garbage_input_is_a_validation_error() {
    let root = project(&[]);

    patchset(&root)
        .args(["apply", "--root", "."])
        .write_stdin("this is not json")
        .assert()
        .code(3);
}

#[test]
fn init_creates_config_once() {
    let root = project(&[]);

    patchset(&root).args(["init"]).assert().success();
    let written = read(&root, "patchset.toml");
    assert!(written.contains("tool_name"));

    patchset(&root)
        .args(["init"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_file_can_point_at_another_failures_dir() {
    let root = project(&[
        ("patchset.toml", "failures_dir = \"records\"\n"),
        ("dup.txt", "v\nv\n"),
    ]);
    let raw = changeset(
        "dup",
        json!([{ "path": "dup.txt", "changes": [{ "change_type": "modifyFile", "oldContent": "v", "newContent": "w" }] }]),
    );

    patchset(&root)
        .args(["--quiet", "apply", "--root", "."])
        .write_stdin(raw)
        .assert()
        .code(2);

    let entries = std::fs::read_dir(root.path().join("records"))
        .expect("records dir")
        .count();
    assert_eq!(entries, 1);
}

#[test]
fn completions_print_to_stdout() {
    let root = project(&[]);

    patchset(&root)
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("patchset"));
}
