//! Delivery of normalized periods to a sink, with recovery-log fallback.
//!
//! A failed delivery is re-encoded as an `idle -> work` / `work -> idle`
//! transition pair for the *raw* interval and appended to the recovery log,
//! so the next run reduces and normalizes it again from scratch.

use chrono::{DateTime, Utc};

use crate::log_file::{EventLog, LogError};
use crate::normalize::{NormalizePolicy, NormalizedInterval};
use crate::reducer::RawInterval;
use crate::transition::TransitionEvent;

/// Prefix of every delivered title.
pub const TITLE_PREFIX: &str = "⏳";

/// The external representation of a normalized interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn from_interval(interval: &NormalizedInterval) -> Self {
        Self {
            title: format!(
                "{TITLE_PREFIX} {}",
                title_minutes(interval.start, interval.end)
            ),
            start: interval.start,
            end: interval.end,
        }
    }
}

/// Minutes shown in a title: plain truncating division, no rounding.
///
/// Kept apart from [`NormalizePolicy::normalize`], which rounds.
pub fn title_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds() / 60_000
}

/// Where delivery records go.
///
/// Every error is treated the same way: the period is queued for retry.
pub trait Sink {
    type Error: std::error::Error;

    fn create(&mut self, record: &DeliveryRecord) -> Result<(), Self::Error>;
}

/// A raw interval together with its normalized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub raw: RawInterval,
    pub normalized: NormalizedInterval,
}

impl Period {
    pub fn record(&self) -> DeliveryRecord {
        DeliveryRecord::from_interval(&self.normalized)
    }
}

/// Normalizes raw intervals, dropping those the policy rejects.
pub fn periods(raw: &[RawInterval], policy: &NormalizePolicy) -> Vec<Period> {
    raw.iter()
        .filter_map(|raw| {
            policy.normalize(raw).map(|normalized| Period {
                raw: *raw,
                normalized,
            })
        })
        .collect()
}

/// The transition pair that reduces back to exactly `raw`.
pub fn recovery_events(raw: &RawInterval) -> [TransitionEvent; 2] {
    [
        TransitionEvent::work_started(raw.start),
        TransitionEvent::work_stopped(raw.end),
    ]
}

/// Serialized recovery lines for `raw`.
pub fn recovery_lines(raw: &RawInterval) -> Result<Vec<String>, serde_json::Error> {
    recovery_events(raw)
        .iter()
        .map(TransitionEvent::to_json_line)
        .collect()
}

/// Errors that stop a delivery pass. Sink failures are not among them.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to encode recovery lines: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to queue period for retry: {0}")]
    Queue(#[from] LogError),
}

/// Result of one delivery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Periods that failed and were written to the recovery log.
    pub requeued: Vec<RawInterval>,
}

impl DeliveryReport {
    pub fn failed(&self) -> usize {
        self.requeued.len()
    }
}

/// Delivers each period in order, queueing failures in `recovery`.
///
/// A failing period never blocks the ones after it. Only a failure to write
/// the recovery log stops the pass.
pub fn deliver_all<S: Sink>(
    sink: &mut S,
    periods: &[Period],
    recovery: &EventLog,
) -> Result<DeliveryReport, DeliveryError> {
    let mut report = DeliveryReport::default();

    for period in periods {
        let record = period.record();
        match sink.create(&record) {
            Ok(()) => {
                tracing::info!(title = %record.title, start = %record.start, "delivered period");
                report.delivered += 1;
            }
            Err(err) => {
                tracing::warn!(
                    title = %record.title,
                    start = %record.start,
                    error = %err,
                    "delivery failed, queueing for retry"
                );
                recovery.append_lines(&recovery_lines(&period.raw)?)?;
                report.requeued.push(period.raw);
            }
        }
    }

    Ok(report)
}
