#![cfg(unix)]

use bpam_entrypoint::adapters::TeeRunner;
use bpam_entrypoint::core::{ProcessRunner, Step};
use bpam_entrypoint::EntrypointError;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::assert_ok;

fn sh(script: &str, log: std::path::PathBuf) -> Step {
    Step::new("/bin/sh", ["-c", script], log)
}

#[tokio::test]
async fn test_merged_output_is_written_to_log() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("nested").join("checksecure.log");

    let step = sh("echo to-stdout; echo to-stderr 1>&2; exit 3", log.clone());
    let code = TeeRunner::new().run_teed(&step, &[]).await.unwrap();

    assert_eq!(code, 3);
    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("to-stdout"));
    assert!(content.contains("to-stderr"));
}

#[tokio::test]
async fn test_log_is_truncated_each_run() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("ingest.log");
    std::fs::write(&log, "stale output from a previous run\n").unwrap();

    let code = assert_ok!(TeeRunner::new().run_teed(&sh("echo fresh", log.clone()), &[]).await);

    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "fresh\n");
}

#[tokio::test]
async fn test_resolved_environment_reaches_child() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("env.log");
    let env = vec![
        ("DBNAME".to_string(), "bpam".to_string()),
        ("MEMCACHE".to_string(), "cache:11211".to_string()),
    ];

    TeeRunner::new()
        .run_teed(&sh("echo \"$DBNAME $MEMCACHE\"", log.clone()), &env)
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "bpam cache:11211\n");
}

#[tokio::test]
async fn test_killed_child_reports_signal_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let step = sh("kill -TERM $$", temp_dir.path().join("killed.log"));

    let code = TeeRunner::new().run_teed(&step, &[]).await.unwrap();
    assert_eq!(code, 128 + 15);
}

#[tokio::test]
async fn test_missing_program_is_a_spawn_error() {
    let temp_dir = TempDir::new().unwrap();
    let step = Step::new(
        "/nonexistent/django-admin.py",
        ["migrate"],
        temp_dir.path().join("migrate.log"),
    );

    let err = TeeRunner::new().run_teed(&step, &[]).await.unwrap_err();
    assert!(matches!(err, EntrypointError::SpawnError { .. }));
    assert_eq!(err.exit_code(), 127);
}

#[tokio::test]
async fn test_unwritable_log_still_runs_step() {
    let temp_dir = TempDir::new().unwrap();
    // A regular file where the log directory should be.
    let blocker = temp_dir.path().join("data");
    std::fs::write(&blocker, "not a directory").unwrap();
    let marker = temp_dir.path().join("ran");

    let step = sh(
        &format!("touch {}", marker.display()),
        blocker.join("checksecure.log"),
    );
    let code = TeeRunner::new().run_teed(&step, &[]).await.unwrap();

    assert_eq!(code, 0);
    assert!(marker.exists());
}

async fn wait_for_log(log: &std::path::Path, needle: &str) {
    for _ in 0..100 {
        if std::fs::read_to_string(log).is_ok_and(|content| content.contains(needle)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never contained {:?}", log.display(), needle);
}

#[tokio::test]
async fn test_forwarded_signal_reaches_running_step() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("uwsgi.log");
    let runner = TeeRunner::new();
    assert_eq!(runner.current_pid(), None);

    let step = sh(
        "trap 'echo got-term; exit 0' TERM; echo ready; while :; do sleep 0.1; done",
        log.clone(),
    );
    let background = runner.clone();
    let handle = tokio::spawn(async move { background.run_teed(&step, &[]).await });

    wait_for_log(&log, "ready").await;
    assert!(runner.current_pid().is_some());
    assert!(runner.forward_signal(libc::SIGTERM));

    let code = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(code, 0);
    assert!(std::fs::read_to_string(&log).unwrap().contains("got-term"));
    assert_eq!(runner.current_pid(), None);
}

#[tokio::test]
async fn test_no_new_steps_after_shutdown_signal() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("ran");
    let runner = TeeRunner::new();

    assert!(!runner.forward_signal(libc::SIGTERM));

    let step = sh(
        &format!("touch {}", marker.display()),
        temp_dir.path().join("migrate.log"),
    );
    let code = runner.run_teed(&step, &[]).await.unwrap();

    assert_eq!(code, 128 + 15);
    assert!(!marker.exists());
    assert!(!temp_dir.path().join("migrate.log").exists());
}
