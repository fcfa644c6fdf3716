//! End-to-end tests driving the depbuild binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn depbuild() -> Command {
    Command::cargo_bin("depbuild").unwrap()
}

const TWO_TASKS: &str = r#"
arch: dont_care
tasks:
  - name: zlib
    build: nmake -f win32/Makefile.msc
  - name: lz4
    build: msbuild lz4.sln
"#;

#[test]
fn test_list_prints_run_order() {
    let (_dir, path) = common::create_test_config(TWO_TASKS);

    depbuild()
        .arg("--list")
        .arg("-f")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("zlib\nlz4\n"));
}

#[test]
fn test_dry_run_all_tasks_succeeds() {
    let (_dir, path) = common::create_test_config(TWO_TASKS);

    depbuild()
        .arg("--dry-run")
        .arg("-f")
        .arg(&path)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("(dry run) nmake -f win32/Makefile.msc"))
        .stderr(predicate::str::contains("(dry run) msbuild lz4.sln"));
}

#[test]
fn test_dry_run_single_task() {
    let (_dir, path) = common::create_test_config(TWO_TASKS);

    depbuild()
        .args(["--dry-run", "lz4", "-f"])
        .arg(&path)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("msbuild lz4.sln"))
        .stderr(predicate::str::contains("nmake").not());
}

#[test]
fn test_unknown_task_exits_with_one() {
    let (_dir, path) = common::create_test_config(TWO_TASKS);

    depbuild()
        .args(["openssl", "-f"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown task 'openssl'"));
}

#[test]
fn test_missing_config_exits_with_one() {
    let dir = tempfile::TempDir::new().unwrap();

    depbuild()
        .arg("-f")
        .arg(dir.path().join("depbuild.yml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[ERROR]"));
}

#[test]
fn test_invalid_config_exits_with_one() {
    let (_dir, path) = common::create_test_config("tasks:\n  - name: \"\"\n    build: nmake\n");

    depbuild().arg("-f").arg(&path).assert().code(1);
}

#[test]
fn test_log_file_written_at_exit() {
    let (dir, path) = common::create_test_config(
        r#"
arch: dont_care
log_file: depbuild.log
dry: true
tasks:
  - name: zlib
    build: nmake
"#,
    );

    depbuild().arg("-f").arg(&path).assert().success();

    let log = std::fs::read_to_string(dir.path().join("depbuild.log")).unwrap();
    assert!(log.contains("[INFO] running task zlib"));
    assert!(log.contains("[INFO] (dry run) nmake"));
}

#[cfg(unix)]
#[test]
fn test_failing_tool_bails_out() {
    let (_dir, path) = common::create_test_config(
        r#"
arch: dont_care
tasks:
  - name: broken
    build: sh -c "exit 3"
  - name: never
    build: sh -c "echo never-ran"
"#,
    );

    depbuild()
        .args(["-v", "-f"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[BAIL] task 'broken' failed during build"))
        .stderr(predicate::str::contains("bailing out"))
        .stderr(predicate::str::contains("never-ran").not());
}

#[cfg(unix)]
mod signals {
    use super::common;
    use std::process::{Command as StdCommand, Stdio};
    use std::thread;
    use std::time::{Duration, Instant};

    const SLOW_THEN_NEVER: &str = r#"
arch: dont_care
grace_period_ms: 2000
tasks:
  - name: slow
    build: sleep 30
  - name: never
    build: sh -c "echo never-ran"
"#;

    /// Start a run, send `signal` once the slow task is underway and
    /// return the exit code, stderr and the time from signal to exit
    fn run_and_signal(signal: libc::c_int) -> (Option<i32>, String, Duration) {
        let (_dir, path) = common::create_test_config(SLOW_THEN_NEVER);

        let child = StdCommand::new(assert_cmd::cargo::cargo_bin("depbuild"))
            .arg("-f")
            .arg(&path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        thread::sleep(Duration::from_millis(1000));
        let signalled = Instant::now();
        unsafe {
            libc::kill(child.id() as libc::pid_t, signal);
        }

        let output = child.wait_with_output().unwrap();
        (
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            signalled.elapsed(),
        )
    }

    #[test]
    fn test_sigint_stops_the_run() {
        let (code, stderr, elapsed) = run_and_signal(libc::SIGINT);

        assert_eq!(code, Some(1));
        assert!(stderr.contains("caught interrupt"));
        assert!(stderr.contains("[WARN] interrupted"));
        assert!(!stderr.contains("running task never"));
        assert!(!stderr.contains("never-ran"));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[test]
    fn test_sigterm_stops_the_run() {
        let (code, stderr, elapsed) = run_and_signal(libc::SIGTERM);

        assert_eq!(code, Some(1));
        assert!(stderr.contains("caught interrupt"));
        assert!(!stderr.contains("never-ran"));
        assert!(elapsed < Duration::from_secs(10));
    }
}

#[test]
fn test_version() {
    depbuild()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
