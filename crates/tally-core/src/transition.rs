//! Timer transition events and the JSONL line format they are stored in.
//!
//! The timer writes one JSON object per line:
//!
//! ```text
//! {"event":"start","fromState":"idle","toState":"work","timestamp":"2025-01-29T12:00:00.000Z","type":"transition"}
//! ```
//!
//! `timestamp` may also be a number of epoch milliseconds, and older writers
//! emit `unixTimestamp` (epoch seconds) instead. When both are present,
//! `timestamp` wins.

use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value of the `type` field on transition lines.
pub const TRANSITION_TYPE: &str = "transition";

/// Event name used when a line omits `event`.
const DEFAULT_EVENT: &str = "transition";

/// Event name written for the synthetic work-entering half of a recovery pair.
pub const START_EVENT: &str = "start";

/// Event name written for the synthetic closing half of a recovery pair.
pub const STOP_EVENT: &str = "stop";

/// Errors from parsing a single log line.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The line is not valid JSON or has a field of the wrong shape.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A field required for transition lines is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The timestamp could not be converted to a point in time.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// The three states a timer moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Work,
    Rest,
}

impl TimerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Work => "work",
            Self::Rest => "rest",
        }
    }

    /// Whether entering this state ends a work interval.
    #[must_use]
    pub const fn is_stopping(self) -> bool {
        matches!(self, Self::Idle | Self::Rest)
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of the timer moving from one state to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    /// Name of the event that caused the transition (e.g. "start", "pause").
    pub event: String,
    pub from: TimerState,
    pub to: TimerState,
    /// When the transition happened, at millisecond precision.
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    /// The `idle -> work` half of a recovery pair.
    pub fn work_started(at: DateTime<Utc>) -> Self {
        Self {
            event: START_EVENT.to_string(),
            from: TimerState::Idle,
            to: TimerState::Work,
            at: at.trunc_subsecs(3),
        }
    }

    /// The `work -> idle` half of a recovery pair.
    pub fn work_stopped(at: DateTime<Utc>) -> Self {
        Self {
            event: STOP_EVENT.to_string(),
            from: TimerState::Work,
            to: TimerState::Idle,
            at: at.trunc_subsecs(3),
        }
    }

    /// The only view of the event the reducer needs.
    #[must_use]
    pub fn log_line(&self) -> LogLine {
        LogLine {
            stopping: self.to.is_stopping(),
            date: self.at,
        }
    }

    /// Serializes the event as one JSONL line (without trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireTransition {
            event: &self.event,
            from_state: self.from,
            to_state: self.to,
            timestamp: self.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            unix_timestamp: self.at.timestamp(),
            kind: TRANSITION_TYPE,
        })
    }
}

/// What the reducer consumes from a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine {
    /// True when the timer moved into `idle` or `rest`.
    pub stopping: bool,
    pub date: DateTime<Utc>,
}

/// Outcome of parsing one line of a transition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Transition(TransitionEvent),
    /// A well-formed entry of some other `type`, which is not ours to reduce.
    Other { kind: String },
    /// Empty or whitespace-only line.
    Blank,
}

/// Parses one line of a transition log.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ParsedLine::Blank);
    }

    let wire: WireLine = serde_json::from_str(trimmed)?;
    let kind = wire.kind.ok_or(ParseError::MissingField("type"))?;
    if kind != TRANSITION_TYPE {
        return Ok(ParsedLine::Other { kind });
    }

    let from = wire.from_state.ok_or(ParseError::MissingField("fromState"))?;
    let to = wire.to_state.ok_or(ParseError::MissingField("toState"))?;
    let at = resolve_timestamp(wire.timestamp, wire.unix_timestamp)?;

    Ok(ParsedLine::Transition(TransitionEvent {
        event: wire.event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        from,
        to,
        at,
    }))
}

fn resolve_timestamp(
    timestamp: Option<WireTimestamp>,
    unix_timestamp: Option<i64>,
) -> Result<DateTime<Utc>, ParseError> {
    let at = match (timestamp, unix_timestamp) {
        (Some(WireTimestamp::Text(text)), _) => DateTime::parse_from_rfc3339(&text)
            .map_err(|err| ParseError::InvalidTimestamp(format!("{text}: {err}")))?
            .with_timezone(&Utc),
        (Some(WireTimestamp::Millis(ms)), _) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| ParseError::InvalidTimestamp(format!("{ms} ms out of range")))?,
        (None, Some(secs)) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ParseError::InvalidTimestamp(format!("{secs} s out of range")))?,
        (None, None) => return Err(ParseError::MissingField("timestamp")),
    };
    // Recovery lines are written at millisecond precision; anything finer
    // would not survive a round trip.
    Ok(at.trunc_subsecs(3))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLine {
    #[serde(rename = "type")]
    kind: Option<String>,
    event: Option<String>,
    from_state: Option<TimerState>,
    to_state: Option<TimerState>,
    timestamp: Option<WireTimestamp>,
    unix_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTransition<'a> {
    event: &'a str,
    from_state: TimerState,
    to_state: TimerState,
    timestamp: String,
    unix_timestamp: i64,
    #[serde(rename = "type")]
    kind: &'static str,
}
