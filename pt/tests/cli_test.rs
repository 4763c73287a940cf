//! CLI tests for the `pt` binary
//!
//! None of these reach a generator: each exercises a path that fails or
//! finishes before the first call.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pt(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pt").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("OPENAI_API_KEY", "sk-test");
    cmd
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    pt(&home).arg("--version").assert().success();
}

#[test]
fn test_invalid_turn_json_prints_error_object() {
    let home = TempDir::new().unwrap();
    pt(&home)
        .arg("turn")
        .write_stdin("this is not json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"error\""))
        .stdout(predicate::str::contains("\"traceback\""))
        .stdout(predicate::str::contains("\"reply\"").not());
}

#[test]
fn test_missing_fields_prints_error_object() {
    let home = TempDir::new().unwrap();
    pt(&home)
        .arg("turn")
        .write_stdin(r#"{"conversation": []}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("prompt"));
}

#[test]
fn test_invalid_transform_json_prints_error_object() {
    let home = TempDir::new().unwrap();
    pt(&home)
        .arg("transform")
        .write_stdin("[1, 2")
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid transform request"));
}

#[test]
fn test_missing_api_key_is_reported_as_json() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("pt.yml");
    std::fs::write(&config, "llm:\n  api-key-env: PRDTURN_TEST_UNSET_KEY\n").unwrap();

    pt(&home)
        .args(["--config", config.to_str().unwrap(), "turn"])
        .env_remove("PRDTURN_TEST_UNSET_KEY")
        .write_stdin("{}")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"error\""))
        .stdout(predicate::str::contains("PRDTURN_TEST_UNSET_KEY"));
}

#[test]
fn test_bad_subcommand_fails() {
    let home = TempDir::new().unwrap();
    pt(&home).arg("frobnicate").assert().failure();
}
