use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_daemon_flags() {
    Command::cargo_bin("concd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--daemon")
                .and(predicate::str::contains("--log-level"))
                .and(predicate::str::contains("--work-dir")),
        );
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("concd")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("concd"));
}

#[test]
fn missing_work_dir_exits_with_config_error() {
    Command::cargo_bin("concd")
        .unwrap()
        .args(["--work-dir", "/definitely/not/a/real/dir"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_log_level_exits_with_config_error() {
    Command::cargo_bin("concd")
        .unwrap()
        .args(["--log-level", "X"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid log level"));
}

#[test]
fn unknown_flags_are_rejected() {
    Command::cargo_bin("concd")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .code(1);
}
