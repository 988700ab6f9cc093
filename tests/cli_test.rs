//! End-to-end CLI tests against the built `miniform` binary, mirroring the
//! teacher's `tests/e2e_test.rs` layout (temp config dir + temp working dir,
//! `assert_cmd` + `predicates`).

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn miniform_cmd(fixture: &std::path::Path, work_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("miniform").unwrap();
    cmd.arg("-c").arg(fixture).arg("-w").arg(work_dir).env("NO_COLOR", "1");
    cmd
}

#[test]
fn validate_reports_counts_for_a_valid_config() {
    let fixture = TempDir::new().unwrap();
    fs::write(
        fixture.path().join("main.mini"),
        r#"resource "null_resource" "a" { triggers = { k = "v" } }"#,
    )
    .unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 resource(s)"));
}

#[test]
fn validate_fails_on_a_lex_error() {
    let fixture = TempDir::new().unwrap();
    fs::write(fixture.path().join("main.mini"), "resource @ bad").unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path()).arg("validate").assert().failure();
}

#[test]
fn plan_reports_no_changes_against_empty_state() {
    let fixture = TempDir::new().unwrap();
    fs::write(
        fixture.path().join("main.mini"),
        r#"resource "null_resource" "a" { triggers = {} }"#,
    )
    .unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to create"));
}

#[test]
fn apply_with_yes_creates_and_state_list_shows_it() {
    let fixture = TempDir::new().unwrap();
    let target = fixture.path().join("out.txt");
    fs::write(
        fixture.path().join("main.mini"),
        format!(r#"resource "local_file" "a" {{ path = "{}" content = "hi" }}"#, target.display()),
    )
    .unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path())
        .arg("apply")
        .arg("-y")
        .assert()
        .success()
        .stdout(predicate::str::contains("creation complete"));

    assert_eq!(fs::read_to_string(&target).unwrap(), "hi");

    miniform_cmd(fixture.path(), work.path())
        .arg("state")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("local_file.a"));
}

#[test]
fn apply_without_yes_and_without_stdin_confirmation_is_cancelled() {
    let fixture = TempDir::new().unwrap();
    fs::write(
        fixture.path().join("main.mini"),
        r#"resource "null_resource" "a" { triggers = {} }"#,
    )
    .unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path())
        .arg("apply")
        .write_stdin("no\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply cancelled"));
}

#[test]
fn output_prints_root_outputs_as_json() {
    let fixture = TempDir::new().unwrap();
    let target = fixture.path().join("out.txt");
    fs::write(
        fixture.path().join("main.mini"),
        format!(
            r#"
            resource "local_file" "a" {{ path = "{}" content = "hi" }}
            output "written_to" {{ value = "${{local_file.a.id}}" }}
            "#,
            target.display()
        ),
    )
    .unwrap();
    let work = TempDir::new().unwrap();

    miniform_cmd(fixture.path(), work.path()).arg("apply").arg("-y").assert().success();

    miniform_cmd(fixture.path(), work.path())
        .arg("output")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("written_to"));
}
