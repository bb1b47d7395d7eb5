//! Sync command: deliver completed work periods and queue failures for retry.

use std::fs::{self, File};
use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use fs2::FileExt;
use thiserror::Error;

use tally_core::{BatchOutcome, Sink, run_batch};

use crate::config::{Config, ConfigError};
use crate::sink::NotionSink;

/// Why a sync run stopped without an outcome.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Required settings are missing; nothing was read or written.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] anyhow::Error),
}

/// Runs one sync batch against Notion.
///
/// Configuration is validated before any log file is opened.
pub fn run(config: &Config) -> Result<BatchOutcome, SyncError> {
    config.batch_config()?;
    let credentials = config.notion_credentials()?;
    let mut sink = NotionSink::new(config, credentials)?;
    run_with_sink(config, &mut sink)
}

/// Runs one sync batch against any sink, holding the run lock.
pub fn run_with_sink<S: Sink>(config: &Config, sink: &mut S) -> Result<BatchOutcome, SyncError> {
    let batch = config.batch_config()?;
    let _lock = acquire_lock(config)?;

    let outcome = run_batch(&config.primary_log(), &config.recovery_log(), sink, &batch)
        .context("sync batch failed")?;
    Ok(outcome)
}

/// Takes the exclusive run lock; released when the file is dropped.
fn acquire_lock(config: &Config) -> anyhow::Result<File> {
    let lock_path = config.lock_path();
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let lock_file = File::create(&lock_path)
        .with_context(|| format!("failed to create {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire sync lock")?;
    Ok(lock_file)
}

/// Writes the user-facing summary of an outcome.
pub fn render<W: Write>(writer: &mut W, outcome: &BatchOutcome) -> std::io::Result<()> {
    match outcome {
        BatchOutcome::Empty => writeln!(writer, "No transitions to process"),
        BatchOutcome::InProgress { open_since } => writeln!(
            writer,
            "Timer still running since {}; nothing to deliver yet",
            open_since.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        BatchOutcome::Delivered(summary) => {
            let delivered = summary.report.delivered;
            write!(writer, "Delivered {delivered} {}", plural(delivered, "period"))?;
            let failed = summary.report.failed();
            if failed > 0 {
                write!(writer, ", {failed} queued for retry")?;
            }
            writeln!(writer)?;
            if summary.skipped_lines > 0 {
                writeln!(
                    writer,
                    "Skipped {} malformed {}",
                    summary.skipped_lines,
                    plural(summary.skipped_lines, "line")
                )?;
            }
            Ok(())
        }
    }
}

/// Exit status for an outcome. An empty log is reported as a failure.
pub const fn exit_code(outcome: &BatchOutcome) -> ExitCode {
    match outcome {
        BatchOutcome::Empty => ExitCode::FAILURE,
        BatchOutcome::InProgress { .. } | BatchOutcome::Delivered(_) => ExitCode::SUCCESS,
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, Utc};
    use tally_core::{BatchSummary, DeliveryRecord, DeliveryReport, RawInterval};

    #[derive(Debug, Default)]
    struct CountingSink {
        calls: usize,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("offline")]
    struct Offline;

    impl Sink for CountingSink {
        type Error = Offline;

        fn create(&mut self, _record: &DeliveryRecord) -> Result<(), Self::Error> {
            self.calls += 1;
            Err(Offline)
        }
    }

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            log_path: dir.join("transitions.jsonl"),
            recovery_log_path: dir.join("recovery.jsonl"),
            ..Config::default()
        }
    }

    fn render_to_string(outcome: &BatchOutcome) -> String {
        let mut out = Vec::new();
        render(&mut out, outcome).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn missing_credentials_fail_before_touching_logs() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_in(temp.path());
        fs::write(&config.log_path, "not even json\n").unwrap();

        let err = run(&config).unwrap_err();

        assert!(matches!(err, SyncError::Config(ConfigError::MissingNotionToken)));
        assert_eq!(fs::read_to_string(&config.log_path).unwrap(), "not even json\n");
        assert!(!config.lock_path().exists());
    }

    #[test]
    fn failing_sink_queues_everything() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_in(temp.path());
        fs::write(
            &config.log_path,
            concat!(
                r#"{"fromState":"idle","toState":"work","unixTimestamp":1738152000,"type":"transition"}"#,
                "\n",
                r#"{"fromState":"work","toState":"rest","unixTimestamp":1738153500,"type":"transition"}"#,
                "\n",
            ),
        )
        .unwrap();
        let mut sink = CountingSink::default();

        let outcome = run_with_sink(&config, &mut sink).unwrap();

        assert_eq!(sink.calls, 1);
        assert_eq!(render_to_string(&outcome), "Delivered 0 periods, 1 queued for retry\n");
        assert_eq!(fs::read_to_string(&config.log_path).unwrap(), "");
        assert_eq!(
            fs::read_to_string(&config.recovery_log_path)
                .unwrap()
                .lines()
                .count(),
            2
        );
    }

    #[test]
    fn renders_each_outcome() {
        let start = DateTime::<Utc>::from_timestamp(1_738_152_000, 0).unwrap();
        assert_eq!(
            render_to_string(&BatchOutcome::Empty),
            "No transitions to process\n"
        );
        assert_eq!(
            render_to_string(&BatchOutcome::InProgress { open_since: start }),
            "Timer still running since 2025-01-29 12:00:00 UTC; nothing to deliver yet\n"
        );

        let summary = BatchSummary {
            report: DeliveryReport {
                delivered: 1,
                requeued: vec![RawInterval {
                    start,
                    end: start + Duration::minutes(10),
                }],
            },
            discarded: 0,
            skipped_lines: 2,
        };
        assert_eq!(
            render_to_string(&BatchOutcome::Delivered(summary)),
            "Delivered 1 period, 1 queued for retry\nSkipped 2 malformed lines\n"
        );
    }
}
