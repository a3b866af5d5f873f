use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn aux_runner() -> Command {
    let mut cmd = Command::cargo_bin("aux-runner").unwrap();
    cmd.env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .arg("--lang")
        .arg("en");
    cmd
}

/// This test runs the `pass.toml` fixture against loopback auxiliaries.
/// It asserts that the command exits successfully and that the summary
/// reports every case as passed.
///
/// 这个测试针对回环辅助设备运行 `pass.toml` 配置。
/// 它断言命令成功退出，并且摘要报告所有用例均已通过。
#[test]
fn test_successful_run() {
    aux_runner()
        .args(["run", "--config", "tests/fixtures/pass.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Auxiliary 'dev1' (loopback) is RUNNING."))
        .stdout(predicate::str::contains("REQ-1"))
        .stdout(predicate::str::contains("Passed: 2  Failed: 0  Skipped: 0"))
        .stdout(predicate::str::contains("All test cases passed!"));
}

/// A payload mismatch fails the run and prints the step transcript.
///
/// 负载不匹配会导致运行失败，并打印步骤记录。
#[test]
fn test_unexpected_response() {
    aux_runner()
        .args(["run", "--config", "tests/fixtures/fail.toml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("--- Unexpected Failures ---"))
        .stdout(predicate::str::contains("'wrong-answer'"))
        .stdout(predicate::str::contains("unexpected response"))
        .stdout(predicate::str::contains("expected payload [50 4F 4E 47]"))
        .stdout(predicate::str::contains("Passed: 2  Failed: 1  Skipped: 0"))
        .stderr(predicate::str::contains("1 case(s) failed unexpectedly."));
}

/// With `--fail-fast` the cases after the first unexpected failure are skipped.
///
/// 使用 `--fail-fast` 时，第一次意外失败之后的用例会被跳过。
#[test]
fn test_fail_fast_skips_remaining_cases() {
    aux_runner()
        .args(["run", "--config", "tests/fixtures/fail.toml", "--fail-fast"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Passed: 1  Failed: 1  Skipped: 1"));
}

#[test]
fn test_allowed_failure_does_not_fail_the_run() {
    aux_runner()
        .args(["run", "--config", "tests/fixtures/allowed_failure.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 selected case(s) are allowed to fail."))
        .stdout(predicate::str::contains("Allowed Failure"));
}

#[test]
fn test_tag_filter() {
    aux_runner()
        .args(["run", "-c", "tests/fixtures/pass.toml", "--tag", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Filtered out 1 case(s); 1 case(s) selected."))
        .stdout(predicate::str::contains("Passed: 1  Failed: 0  Skipped: 0"));
}

#[test]
fn test_unknown_case_name() {
    aux_runner()
        .args(["run", "-c", "tests/fixtures/pass.toml", "--case", "pnig"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown test case 'pnig'"));
}

#[test]
fn test_missing_config() {
    aux_runner()
        .args(["run", "--config", "tests/fixtures/does_not_exist.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read configuration file"));
}

/// The journal holds one record per executed command, starts and stops included.
///
/// 命令日志为每条已执行的命令保留一条记录，包括启动和停止。
#[test]
fn test_journal_export() {
    let dir = tempdir().unwrap();
    let journal = dir.path().join("out").join("journal.json");

    aux_runner()
        .args(["run", "-c", "tests/fixtures/pass.toml", "--journal"])
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("command record(s)"));

    let records: serde_json::Value = serde_json::from_str(&fs::read_to_string(&journal).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    // 2 starts + 3 device commands + 2 stops
    assert_eq!(records.len(), 7);
    assert!(records.iter().any(|r| r["kind"] == "listen" && r["status"] == "timeout"));
    assert!(
        records
            .iter()
            .filter(|r| r["kind"] == "stop")
            .all(|r| r["status"] == "ok")
    );
}

#[test]
fn test_init_non_interactive() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("Auxiliaries.toml");

    aux_runner()
        .args(["init", "--non-interactive", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("[[auxiliaries]]"));

    // The generated file runs as-is.
    aux_runner()
        .args(["run", "--config"])
        .arg(&output)
        .assert()
        .success();
}

#[test]
fn test_init_keeps_existing_file_without_force() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("Auxiliaries.toml");
    fs::write(&output, "# mine\n").unwrap();

    aux_runner()
        .args(["init", "--non-interactive", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Use --force to overwrite it."));
    assert_eq!(fs::read_to_string(&output).unwrap(), "# mine\n");

    aux_runner()
        .args(["init", "--non-interactive", "--force", "--output"])
        .arg(&output)
        .assert()
        .success();
    assert!(fs::read_to_string(&output).unwrap().contains("[[cases]]"));
}

#[test]
fn test_zh_cn_output() {
    Command::cargo_bin("aux-runner")
        .unwrap()
        .args(["--lang", "zh-CN", "run", "-c", "tests/fixtures/pass.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All test cases passed!").not());
}
