//! Minute quantization and clamping of raw intervals.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::reducer::RawInterval;

const MINUTE_MS: i64 = 60_000;

/// Default shortest period worth reporting.
pub const DEFAULT_MIN_MINUTES: u32 = 5;

/// Default cap, matching one work cycle.
pub const DEFAULT_MAX_MINUTES: u32 = 25;

/// Invalid normalization bounds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("min_minutes must be at least 1")]
    ZeroMinimum,

    #[error("min_minutes ({min}) cannot exceed max_minutes ({max})")]
    InvertedBounds { min: u32, max: u32 },
}

/// A raw interval after quantization and clamping.
///
/// `end - start` is always a whole number of minutes within the policy bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl NormalizedInterval {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Bounds applied to every raw interval before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePolicy {
    min_minutes: u32,
    max_minutes: u32,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            min_minutes: DEFAULT_MIN_MINUTES,
            max_minutes: DEFAULT_MAX_MINUTES,
        }
    }
}

impl NormalizePolicy {
    pub const fn new(min_minutes: u32, max_minutes: u32) -> Result<Self, PolicyError> {
        if min_minutes == 0 {
            return Err(PolicyError::ZeroMinimum);
        }
        if min_minutes > max_minutes {
            return Err(PolicyError::InvertedBounds {
                min: min_minutes,
                max: max_minutes,
            });
        }
        Ok(Self {
            min_minutes,
            max_minutes,
        })
    }

    pub const fn min_minutes(&self) -> u32 {
        self.min_minutes
    }

    pub const fn max_minutes(&self) -> u32 {
        self.max_minutes
    }

    /// Rounds the interval to whole minutes, drops it when below the
    /// minimum and caps it at the maximum.
    ///
    /// The cap is applied by moving `end`; the excess is discarded.
    pub fn normalize(&self, raw: &RawInterval) -> Option<NormalizedInterval> {
        let duration_ms = raw.duration().num_milliseconds();
        let quantized_ms = round_to_minutes(duration_ms) * MINUTE_MS;

        if quantized_ms < i64::from(self.min_minutes) * MINUTE_MS {
            tracing::debug!(
                start = %raw.start,
                duration_ms,
                min_minutes = self.min_minutes,
                "dropping interval below minimum"
            );
            return None;
        }

        let clamped_ms = quantized_ms.min(i64::from(self.max_minutes) * MINUTE_MS);
        Some(NormalizedInterval {
            start: raw.start,
            end: raw.start + Duration::milliseconds(clamped_ms),
        })
    }
}

/// Nearest whole minute, halves rounding away from zero.
const fn round_to_minutes(duration_ms: i64) -> i64 {
    let half = MINUTE_MS / 2;
    if duration_ms >= 0 {
        (duration_ms + half) / MINUTE_MS
    } else {
        -((-duration_ms + half) / MINUTE_MS)
    }
}
