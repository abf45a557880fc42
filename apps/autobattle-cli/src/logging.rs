//! Logging setup and log file retention.
//!
//! Logs always go to stderr. With `--log-dir` a JSON copy is also written to
//! `<dir>/logs/<YYYYMMDD_HHMMSS>.log`, one file per invocation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live until
/// the program exits.
///
/// # Errors
///
/// Returns an error if the log file cannot be created.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(stderr).init();
        return Ok(None);
    };

    let (writer, guard) = open_log_writer(dir)?;
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(env_filter());
    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(Some(guard))
}

/// `RUST_LOG` when set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn open_log_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let logs = dir.join("logs");
    fs::create_dir_all(&logs)
        .with_context(|| format!("failed to create log directory: {}", logs.display()))?;

    let path = log_file_path(&logs, SystemTime::now());
    let file = fs::File::create(&path)
        .with_context(|| format!("failed to create log file: {}", path.display()))?;
    Ok(tracing_appender::non_blocking(file))
}

fn log_file_path(logs: &Path, at: SystemTime) -> PathBuf {
    logs.join(format!("{}.log", utc_stamp(at)))
}

/// Delete `.log` files older than three days from `<dir>/logs`.
///
/// Runs before the subscriber exists, so failures go to stderr directly and
/// never abort start-up.
pub fn cleanup_old_logs(dir: &Path) {
    let logs = dir.join("logs");
    let Ok(entries) = fs::read_dir(&logs) else {
        return;
    };
    let Some(cutoff) = SystemTime::now().checked_sub(LOG_RETENTION) else {
        return;
    };

    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }
        let stale = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .is_ok_and(|modified| modified < cutoff);
        if stale && let Err(e) = fs::remove_file(&path) {
            eprintln!("warning: failed to remove old log {}: {e}", path.display());
        }
    }
}

/// `YYYYMMDD_HHMMSS` in UTC.
fn utc_stamp(at: SystemTime) -> String {
    let secs = at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day) = civil_date(secs / 86_400);
    let clock = secs % 86_400;
    format!(
        "{year:04}{month:02}{day:02}_{:02}{:02}{:02}",
        clock / 3600,
        clock % 3600 / 60,
        clock % 60
    )
}

/// Gregorian date for a day count since 1970-01-01.
fn civil_date(days: u64) -> (u64, u64, u64) {
    // Count from 0000-03-01 so the leap day ends each 400-year cycle.
    let shifted = days + 719_468;
    let era = shifted / 146_097;
    let day_of_era = shifted % 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_index + 2) / 5 + 1;
    let month = if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    };
    let year = era * 400 + year_of_era + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use filetime::{FileTime, set_file_mtime};

    use super::*;

    fn backdate(path: &Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        set_file_mtime(path, FileTime::from_system_time(then)).expect("should set mtime");
    }

    #[test]
    fn test_should_stamp_epoch_and_known_instant() {
        assert_eq!(utc_stamp(UNIX_EPOCH), "19700101_000000");
        // 2026-10-18 09:05:07 UTC
        let at = UNIX_EPOCH + Duration::from_secs(1_792_314_307);
        assert_eq!(utc_stamp(at), "20261018_090507");
    }

    #[test]
    fn test_should_map_days_to_calendar_dates() {
        assert_eq!(civil_date(0), (1970, 1, 1));
        assert_eq!(civil_date(10_957), (2000, 1, 1));
        assert_eq!(civil_date(19_782), (2024, 2, 29));
        assert_eq!(civil_date(19_783), (2024, 3, 1));
    }

    #[test]
    fn test_should_name_log_file_after_timestamp() {
        let path = log_file_path(Path::new("/var/autobattle/logs"), UNIX_EPOCH);
        assert_eq!(path, PathBuf::from("/var/autobattle/logs/19700101_000000.log"));
    }

    #[test]
    fn test_should_remove_only_stale_log_files() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let logs = tmp.path().join("logs");
        fs::create_dir_all(&logs).expect("should create logs dir");

        let fresh = logs.join("fresh.log");
        let stale = logs.join("stale.log");
        let notes = logs.join("notes.txt");
        for path in [&fresh, &stale, &notes] {
            fs::write(path, "x").expect("should write file");
        }
        backdate(&stale, 4);
        backdate(&notes, 4);

        cleanup_old_logs(tmp.path());

        assert!(fresh.exists());
        assert!(!stale.exists());
        assert!(notes.exists());
    }

    #[test]
    fn test_should_ignore_missing_logs_dir() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        cleanup_old_logs(tmp.path());
        assert!(!tmp.path().join("logs").exists());
    }

    #[test]
    fn test_should_create_one_log_file() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let (_writer, _guard) = open_log_writer(tmp.path()).expect("should open log file");

        let files: Vec<_> = fs::read_dir(tmp.path().join("logs"))
            .expect("should read logs dir")
            .filter_map(|entry| entry.ok())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].path().extension().and_then(|ext| ext.to_str()),
            Some("log")
        );
    }

    #[test]
    fn test_should_fail_when_log_dir_cannot_be_created() {
        assert!(open_log_writer(Path::new("/dev/null")).is_err());
    }
}
