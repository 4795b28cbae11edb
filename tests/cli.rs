mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

use common::{Submission, BROKEN_C, HELLO_C};

const CHECKS: &str = r#"
language = "c"

[[check]]
name = "exists"
description = "hello.c exists"
steps = [{ exists = "hello.c" }]

[[check]]
name = "compiles"
description = "hello.c compiles"
depends = "exists"
steps = [{ compile = { files = ["hello.c"] } }]

[[check]]
name = "prints_hello"
description = "prints 'Hello, World!'"
depends = "compiles"
steps = [{ run = { command = "./hello", expect = [{ stdout = "Hello" }, { exit = 0 }] } }]
"#;

fn grader(submission: &Submission) -> Command {
    let languages = submission.write_tool("languages.toml", &submission.languages_toml());
    let checks = submission.write_tool("checks.toml", CHECKS);

    let mut cmd = cargo_bin_cmd!("grader");
    cmd.env("GRADER_LANGUAGES_CONFIG", languages)
        .env("GRADER_STDOUT_TIMEOUT_MS", "1000")
        .env("RUST_LOG", "grader=warn")
        .arg(checks)
        .arg("--root")
        .arg(&submission.root);
    cmd
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

#[test]
fn passing_submission_exits_zero() {
    let submission = Submission::new(&[("hello.c", HELLO_C)]);

    grader(&submission)
        .assert()
        .success()
        .stdout(contains("[PASS] hello.c exists (exists)"))
        .stdout(contains("[PASS] prints 'Hello, World!' (prints_hello)"));
}

#[test]
fn failing_submission_reports_json() {
    let submission = Submission::new(&[("hello.c", BROKEN_C)]);

    let out = grader(&submission)
        .args(["--output", "json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let results = json_lines(&out);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["passed"], true);
    assert_eq!(results[1]["passed"], false);
    assert_eq!(results[1]["cause"]["rationale"], "code failed to compile");
    assert_eq!(results[2]["passed"], Value::Null);
    assert_eq!(results[2]["dependency"], "compiles");
}

#[test]
fn target_limits_the_run() {
    let submission = Submission::new(&[("hello.c", HELLO_C)]);

    let out = grader(&submission)
        .args(["--output", "json", "--target", "compiles"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let names: Vec<String> = json_lines(&out)
        .iter()
        .map(|r| r["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["exists", "compiles"]);
}

#[test]
fn log_flag_prints_check_logs() {
    let submission = Submission::new(&[("hello.c", BROKEN_C)]);

    grader(&submission)
        .arg("--log")
        .assert()
        .failure()
        .stdout(contains("[SKIP]"))
        .stdout(contains("| checking that hello.c exists..."))
        .stdout(contains("use of undeclared identifier"));
}

#[test]
fn unknown_target_is_an_error() {
    let submission = Submission::new(&[("hello.c", HELLO_C)]);

    grader(&submission)
        .args(["--target", "prints_helo"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(contains("did you mean \"prints_hello\"?"));
}

#[test]
fn missing_checks_file_is_an_error() {
    cargo_bin_cmd!("grader")
        .arg("/nonexistent/checks.toml")
        .assert()
        .failure()
        .stderr(contains("Failed to read checks file"));
}
