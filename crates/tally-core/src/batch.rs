//! One sync run: load, merge, reduce, normalize, deliver, acknowledge.
//!
//! # Ordering
//!
//! 1. The primary log is read and parsed.
//! 2. The recovery log is read, parsed and then truncated.
//! 3. Both are merged (recovery lines last by default).
//! 4. If the merged stream ends inside a work interval the whole batch waits
//!    for the next run, and the recovery lines read in step 2 are written back.
//! 5. Otherwise every period is delivered in order and the primary log is
//!    truncated.
//!
//! The primary log is only truncated after every period has either been
//! delivered or queued in the recovery log. A crash before that point
//! reprocesses the same batch on the next run. If queueing a failure fails,
//! the run stops with the primary log intact and the recovered lines are
//! written back (to the primary log if the recovery log is unwritable).
//!
//! With [`RecoveryOrder::Append`] a non-empty recovery log always ends the
//! merged stream with a stopping line. A work interval still open in the
//! primary log then does not defer the batch: the recovery stop closes it at
//! an earlier time, the reducer drops it, and the primary log is truncated.
//! Use [`RecoveryOrder::Prepend`] when retries may be queued while the timer
//! is running.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::{DeliveryError, DeliveryReport, Period, Sink, deliver_all, periods};
use crate::log_file::{EventLog, LogError};
use crate::normalize::NormalizePolicy;
use crate::reducer::{Reducer, ends_in_progress, reduce};
use crate::transition::{LogLine, ParseError, ParsedLine, TransitionEvent, parse_line};

/// Where recovered lines go relative to the primary log's lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryOrder {
    /// After the primary lines. Older retries are reduced after newer events.
    #[default]
    Append,
    /// Before the primary lines.
    Prepend,
}

/// What to do with a line that does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Log a warning and leave the line out.
    #[default]
    Skip,
    /// Fail the run before any file is modified.
    Abort,
}

/// Settings for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchConfig {
    pub policy: NormalizePolicy,
    pub recovery_order: RecoveryOrder,
    pub malformed_lines: MalformedLinePolicy,
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error("malformed line {line} in {path}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Counts reported by a run that reached delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub report: DeliveryReport,
    /// Raw intervals the normalizer rejected as too short.
    pub discarded: usize,
    /// Malformed lines left out under [`MalformedLinePolicy::Skip`].
    pub skipped_lines: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No transitions in either log.
    Empty,
    /// The timer is still in a work interval; nothing was delivered.
    InProgress { open_since: DateTime<Utc> },
    /// Every period was attempted and the primary log was truncated.
    Delivered(BatchSummary),
}

/// Parsed contents of one log file.
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    /// Lines exactly as read, for writing back.
    pub raw_lines: Vec<String>,
    pub events: Vec<TransitionEvent>,
    pub skipped_lines: usize,
}

impl LoadedLog {
    fn read(log: &EventLog, malformed: MalformedLinePolicy) -> Result<Self, BatchError> {
        let raw_lines = log.read_lines()?;
        let mut events = Vec::with_capacity(raw_lines.len());
        let mut skipped_lines = 0;

        for (idx, line) in raw_lines.iter().enumerate() {
            match parse_line(line) {
                Ok(ParsedLine::Transition(event)) => events.push(event),
                Ok(ParsedLine::Other { kind }) => {
                    tracing::debug!(
                        path = %log.path().display(),
                        line = idx + 1,
                        kind = %kind,
                        "ignoring non-transition line"
                    );
                }
                Ok(ParsedLine::Blank) => {}
                Err(source) => match malformed {
                    MalformedLinePolicy::Skip => {
                        tracing::warn!(
                            path = %log.path().display(),
                            line = idx + 1,
                            error = %source,
                            "skipping malformed line"
                        );
                        skipped_lines += 1;
                    }
                    MalformedLinePolicy::Abort => {
                        return Err(BatchError::Malformed {
                            path: log.path().to_path_buf(),
                            line: idx + 1,
                            source,
                        });
                    }
                },
            }
        }

        Ok(Self {
            raw_lines,
            events,
            skipped_lines,
        })
    }
}

/// Reads the recovery log and clears it.
///
/// A missing or empty recovery log contributes nothing and is not touched.
pub fn load_recovery(
    recovery: &EventLog,
    malformed: MalformedLinePolicy,
) -> Result<LoadedLog, BatchError> {
    let loaded = LoadedLog::read(recovery, malformed)?;
    if !loaded.raw_lines.is_empty() {
        recovery.truncate()?;
        tracing::debug!(
            path = %recovery.path().display(),
            events = loaded.events.len(),
            "loaded recovery log"
        );
    }
    Ok(loaded)
}

fn merge(primary: &LoadedLog, recovered: &LoadedLog, order: RecoveryOrder) -> Vec<LogLine> {
    let primary = primary.events.iter().map(TransitionEvent::log_line);
    let recovered = recovered.events.iter().map(TransitionEvent::log_line);
    match order {
        RecoveryOrder::Append => primary.chain(recovered).collect(),
        RecoveryOrder::Prepend => recovered.chain(primary).collect(),
    }
}

fn open_since(lines: &[LogLine]) -> Option<DateTime<Utc>> {
    let mut reducer = Reducer::new();
    for line in lines {
        reducer.push(line);
    }
    reducer.open_since()
}

/// What a run would deliver, computed without touching any file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Merged transitions.
    pub lines: usize,
    pub periods: Vec<Period>,
    pub discarded: usize,
    pub skipped_lines: usize,
    /// Set when the merged stream ends inside a work interval.
    pub open_since: Option<DateTime<Utc>>,
}

impl BatchPlan {
    pub const fn in_progress(&self) -> bool {
        self.open_since.is_some()
    }
}

/// Dry run of [`run_batch`].
pub fn plan_batch(
    primary: &EventLog,
    recovery: &EventLog,
    config: &BatchConfig,
) -> Result<BatchPlan, BatchError> {
    let primary_log = LoadedLog::read(primary, config.malformed_lines)?;
    let recovered = LoadedLog::read(recovery, config.malformed_lines)?;
    let lines = merge(&primary_log, &recovered, config.recovery_order);

    let raw = reduce(&lines);
    let periods = periods(&raw, &config.policy);
    Ok(BatchPlan {
        lines: lines.len(),
        discarded: raw.len() - periods.len(),
        periods,
        skipped_lines: primary_log.skipped_lines + recovered.skipped_lines,
        open_since: if ends_in_progress(&lines) {
            open_since(&lines)
        } else {
            None
        },
    })
}

/// Runs one batch against `sink`.
pub fn run_batch<S: Sink>(
    primary: &EventLog,
    recovery: &EventLog,
    sink: &mut S,
    config: &BatchConfig,
) -> Result<BatchOutcome, BatchError> {
    let primary_log = LoadedLog::read(primary, config.malformed_lines)?;
    let recovered = load_recovery(recovery, config.malformed_lines)?;
    let lines = merge(&primary_log, &recovered, config.recovery_order);

    if lines.is_empty() {
        restore(recovery, &recovered)?;
        tracing::info!(path = %primary.path().display(), "no transitions to process");
        return Ok(BatchOutcome::Empty);
    }

    if ends_in_progress(&lines) {
        restore(recovery, &recovered)?;
        let open_since = open_since(&lines)
            .or_else(|| lines.last().map(|line| line.date))
            .unwrap_or_else(Utc::now);
        tracing::info!(%open_since, "work interval still open, deferring batch");
        return Ok(BatchOutcome::InProgress { open_since });
    }

    let raw = reduce(&lines);
    let periods = periods(&raw, &config.policy);
    let discarded = raw.len() - periods.len();
    tracing::debug!(
        lines = lines.len(),
        intervals = raw.len(),
        periods = periods.len(),
        "reduced batch"
    );

    let report = match deliver_all(sink, &periods, recovery) {
        Ok(report) => report,
        Err(err) => {
            preserve_recovered(primary, recovery, &recovered);
            return Err(err.into());
        }
    };
    primary.truncate()?;

    Ok(BatchOutcome::Delivered(BatchSummary {
        report,
        discarded,
        skipped_lines: primary_log.skipped_lines + recovered.skipped_lines,
    }))
}

fn restore(recovery: &EventLog, recovered: &LoadedLog) -> Result<(), LogError> {
    if recovered.raw_lines.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        path = %recovery.path().display(),
        lines = recovered.raw_lines.len(),
        "restoring recovery log"
    );
    recovery.append_lines(&recovered.raw_lines)
}

/// Puts recovered lines back after a delivery pass failed.
///
/// If the recovery log cannot take them they go to the end of the primary
/// log, which is left in place on this path.
fn preserve_recovered(primary: &EventLog, recovery: &EventLog, recovered: &LoadedLog) {
    let Err(err) = restore(recovery, recovered) else {
        return;
    };
    tracing::warn!(
        path = %recovery.path().display(),
        error = %err,
        "recovery log unwritable, keeping queued lines in the primary log"
    );
    if let Err(err) = primary.append_lines(&recovered.raw_lines) {
        tracing::error!(
            path = %primary.path().display(),
            lines = recovered.raw_lines.len(),
            error = %err,
            "failed to preserve recovered lines"
        );
    }
}

/// Number of parseable transitions in `log`, skipping anything malformed.
pub fn count_transitions(log: &EventLog) -> Result<usize, BatchError> {
    Ok(LoadedLog::read(log, MalformedLinePolicy::Skip)?.events.len())
}
