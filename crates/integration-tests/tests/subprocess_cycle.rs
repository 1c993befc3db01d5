//! End-to-end run with real child processes standing in for the containers
#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vacancy_watch_core::application::{
    ChangeDetector, CheckJobConfig, ExclusionGuard, JobRunner, MailJobConfig, NotificationDispatcher,
    shutdown_channel, Orchestrator, RetentionPolicy, RetentionSweeper, RetryPolicy, RunOutcome,
    ShutdownToken,
};
use vacancy_watch_core::domain::snapshot::DEFAULT_SNAPSHOT_PREFIX;
use vacancy_watch_core::domain::{
    CommandTemplate, DispatchOutcome, JobKind, NotificationConfig, NotifyReason, RunStamp,
};
use vacancy_watch_core::port::{SystemTimeProvider, TimeProvider};
use vacancy_watch_core::AppError;
use vacancy_watch_infra_fs::{FsArtifactStore, FsSnapshotStore, PidLockFile};
use vacancy_watch_infra_system::{ProcessProbeImpl, SubprocessExecutor};

const SNAPSHOT: &str = r#"{"timestamp": "2025-10-06T23:18:25", "summary": {"total_checked": 1, "total_vacant_rooms": 2, "properties_with_vacancies": 1}, "results": [{"url": "https://www.ur-net.go.jp/A", "property_name": "A", "total_vacant": 2, "status": "success", "details": {}}]}"#;

fn sh(script: &str) -> CommandTemplate {
    CommandTemplate::new("/bin/sh", ["-c", script])
}

/// `fixture` plays the role of the URL catalogue; the check job copies it
/// into place as the run's snapshot
fn orchestrator(root: &Path, check: CommandTemplate, mail: CommandTemplate) -> Orchestrator {
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let results = root.join("results");
    let logs = root.join("logs");
    let snapshots = Arc::new(FsSnapshotStore::new(&results, DEFAULT_SNAPSHOT_PREFIX));
    let executor = Arc::new(SubprocessExecutor::new(time.clone(), vec!["PATH".to_string()]));
    // Unique prefix so unrelated processes never look like companions
    let prefix = format!("vw-it-{}", std::process::id());

    let pairs: HashMap<String, String> = [
        ("DEFAULT_TO_ADDR", "ops@example.com"),
        ("SMTP_USER", "bot"),
        ("SMTP_PASS", "secret"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let notification = NotificationConfig::from_pairs(&pairs);

    Orchestrator::new(
        ExclusionGuard::new(
            Arc::new(PidLockFile::new(root.join("watch.lock"))),
            Arc::new(ProcessProbeImpl::new(time.clone())),
            JobKind::all_companion_patterns(&prefix),
        ),
        JobRunner::new(
            executor.clone(),
            snapshots.clone(),
            time.clone(),
            RetryPolicy::fixed(3, Duration::from_millis(50)),
            CheckJobConfig {
                job_name_prefix: prefix.clone(),
                template: check,
                image: "unused".to_string(),
                catalogue: root.join("fixture.json"),
                request_delay_secs: 0,
                logs_dir: logs.clone(),
                timeout: Some(Duration::from_secs(10)),
            },
        ),
        ChangeDetector::new(snapshots, true),
        NotificationDispatcher::new(
            executor,
            notification,
            MailJobConfig {
                job_name_prefix: prefix,
                template: mail,
                image: "unused".to_string(),
                config_file: root.join(".env"),
                subject_prefix: "UR-NET vacancy report".to_string(),
                logs_dir: logs.clone(),
                timeout: Some(Duration::from_secs(10)),
            },
        ),
        RetentionSweeper::new(
            Arc::new(FsArtifactStore::new(&results, &logs, DEFAULT_SNAPSHOT_PREFIX)),
            time,
            RetentionPolicy::default(),
        ),
    )
}

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("results")).unwrap();
    std::fs::write(dir.path().join("fixture.json"), SNAPSHOT).unwrap();
    dir
}

fn stamp() -> RunStamp {
    RunStamp::parse("20251006_231825").unwrap()
}

#[tokio::test]
async fn test_real_jobs_first_run() {
    let dir = setup();
    let orchestrator = orchestrator(
        dir.path(),
        sh("echo checking {delay}; cp {catalogue} {results_dir}/ur_net_results_{stamp}.json"),
        sh("test -s {snapshot} && echo sent: {subject}"),
    );

    let outcome = orchestrator
        .run_exclusive(&stamp(), ShutdownToken::never())
        .await
        .unwrap();

    let RunOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.diff.reason, NotifyReason::FirstRun);
    assert_eq!(report.dispatch, DispatchOutcome::Sent);

    let check_log = std::fs::read_to_string(dir.path().join("logs/check_20251006_231825.log")).unwrap();
    assert!(check_log.contains("checking 0"));
    let notify_log = std::fs::read_to_string(dir.path().join("logs/notify_20251006_231825.log")).unwrap();
    assert!(notify_log.contains("sent: UR-NET vacancy report 2025-10-06 23:18"));
    assert!(!dir.path().join("watch.lock").exists());
}

#[tokio::test]
async fn test_real_check_job_failure_surfaces_output() {
    let dir = setup();
    let orchestrator = orchestrator(
        dir.path(),
        sh("echo scraper crashed >&2; exit 4"),
        sh("true"),
    );

    let err = orchestrator
        .run_exclusive(&stamp(), ShutdownToken::never())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::JobFailed { exit_code: Some(4), .. }));
    assert!(err.captured_output().unwrap().contains("scraper crashed"));
    assert!(!dir.path().join("watch.lock").exists());
}

#[tokio::test]
async fn test_missing_catalogue_fails_before_running() {
    let dir = setup();
    std::fs::remove_file(dir.path().join("fixture.json")).unwrap();
    let orchestrator = orchestrator(dir.path(), sh("touch {results_dir}/ran"), sh("true"));

    let err = orchestrator
        .run_exclusive(&stamp(), ShutdownToken::never())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Environment(_)));
    assert!(!dir.path().join("results/ran").exists());
}

#[tokio::test]
async fn test_interrupt_lets_check_job_shut_down() {
    let dir = setup();
    let orchestrator = orchestrator(
        dir.path(),
        sh("trap 'echo term > {results_dir}/terminated; exit 0' TERM; while true; do sleep 0.05; done"),
        sh("touch {results_dir}/mailed"),
    );
    let (tx, token) = shutdown_channel();

    let interrupt = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.shutdown();
    };
    let run_stamp = stamp();
    let (outcome, ()) = tokio::join!(orchestrator.run_exclusive(&run_stamp, token), interrupt);

    assert!(matches!(outcome.unwrap(), RunOutcome::Interrupted));
    let marker = std::fs::read_to_string(dir.path().join("results/terminated")).unwrap();
    assert_eq!(marker.trim(), "term");
    assert!(!dir.path().join("results/mailed").exists());
    assert!(!dir.path().join("watch.lock").exists());
}
