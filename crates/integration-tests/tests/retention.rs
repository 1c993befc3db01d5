//! Retention horizon over real results and log directories

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use vacancy_watch_core::application::{RetentionPolicy, RetentionSweeper};
use vacancy_watch_core::domain::snapshot::DEFAULT_SNAPSHOT_PREFIX;
use vacancy_watch_core::port::SystemTimeProvider;
use vacancy_watch_infra_fs::FsArtifactStore;

const DAY: u64 = 86_400;
const HOUR: u64 = 3_600;

fn aged_file(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "{}").unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
    path
}

fn sweeper(results: &Path, logs: &Path, policy: RetentionPolicy) -> RetentionSweeper {
    RetentionSweeper::new(
        Arc::new(FsArtifactStore::new(results, logs, DEFAULT_SNAPSHOT_PREFIX)),
        Arc::new(SystemTimeProvider),
        policy,
    )
}

#[tokio::test]
async fn test_seven_days_kept_eight_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    let logs = dir.path().join("logs");
    std::fs::create_dir_all(&results).unwrap();
    std::fs::create_dir_all(&logs).unwrap();

    let kept_snapshot = aged_file(&results, "ur_net_results_20251001_000000.json", 7 * DAY + HOUR);
    let old_snapshot = aged_file(&results, "ur_net_results_20250930_000000.json", 8 * DAY + HOUR);
    let kept_log = aged_file(&logs, "check_20251001_000000.log", 7 * DAY + HOUR);
    let old_log = aged_file(&logs, "run_20250930_000000.log", 8 * DAY + HOUR);

    let report = sweeper(&results, &logs, RetentionPolicy::default()).sweep().await;

    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.retained, 2);
    assert!(report.failed.is_empty());
    assert!(kept_snapshot.exists());
    assert!(kept_log.exists());
    assert!(!old_snapshot.exists());
    assert!(!old_log.exists());
}

#[tokio::test]
async fn test_foreign_files_are_never_touched() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    std::fs::create_dir_all(&results).unwrap();

    let catalogue = aged_file(&results, "urls.txt", 90 * DAY);
    let other_json = aged_file(&results, "settings.json", 90 * DAY);

    let report = sweeper(&results, &dir.path().join("logs"), RetentionPolicy::default())
        .sweep()
        .await;

    assert!(report.deleted.is_empty());
    assert!(catalogue.exists());
    assert!(other_json.exists());
}

#[tokio::test]
async fn test_missing_directories_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let report = sweeper(
        &dir.path().join("results"),
        &dir.path().join("logs"),
        RetentionPolicy::uniform(1),
    )
    .sweep()
    .await;

    assert!(report.deleted.is_empty());
    assert_eq!(report.retained, 0);
}
