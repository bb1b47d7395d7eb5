//! Work interval extraction.
//!
//! Folds transition lines into raw `(start, end)` work intervals with a
//! two-state machine:
//!
//! | State       | Line         | Effect                               |
//! |-------------|--------------|--------------------------------------|
//! | `Idle`      | non-stopping | open at `line.date`                  |
//! | `Idle`      | stopping     | ignored                              |
//! | `InWork(s)` | non-stopping | ignored, the first opener wins       |
//! | `InWork(s)` | stopping     | emit `(s, line.date)` and close      |
//!
//! Lines are consumed in the order given. Nothing is sorted here.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::transition::LogLine;

/// An unprocessed interval taken straight from the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RawInterval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ReducerState {
    #[default]
    Idle,
    InWork {
        start: DateTime<Utc>,
    },
}

/// Incremental form of [`reduce`].
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    state: ReducerState,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, returning the interval it closes (if any).
    pub fn push(&mut self, line: &LogLine) -> Option<RawInterval> {
        match (self.state, line.stopping) {
            (ReducerState::Idle, false) => {
                self.state = ReducerState::InWork { start: line.date };
                None
            }
            (ReducerState::Idle, true) | (ReducerState::InWork { .. }, false) => None,
            (ReducerState::InWork { start }, true) => {
                self.state = ReducerState::Idle;
                if line.date > start {
                    Some(RawInterval {
                        start,
                        end: line.date,
                    })
                } else {
                    tracing::debug!(
                        %start,
                        end = %line.date,
                        "dropping interval that does not move forward in time"
                    );
                    None
                }
            }
        }
    }

    /// Start of the currently open interval.
    pub const fn open_since(&self) -> Option<DateTime<Utc>> {
        match self.state {
            ReducerState::Idle => None,
            ReducerState::InWork { start } => Some(start),
        }
    }
}

/// Reduces chronological lines to raw work intervals.
///
/// An interval still open when the lines run out is not emitted.
pub fn reduce(lines: &[LogLine]) -> Vec<RawInterval> {
    let mut reducer = Reducer::new();
    lines.iter().filter_map(|line| reducer.push(line)).collect()
}

/// True when the last line leaves a work interval open.
pub fn ends_in_progress(lines: &[LogLine]) -> bool {
    lines.last().is_some_and(|line| !line.stopping)
}
