//! Core domain logic for tally.
//!
//! This crate contains the fundamental types and logic for:
//! - Parsing timer transition logs
//! - Reducing transitions to raw work intervals
//! - Normalizing intervals to whole-minute periods
//! - Delivering periods to a sink with recovery-log retry

pub mod batch;
pub mod delivery;
pub mod log_file;
pub mod normalize;
pub mod reducer;
pub mod transition;

pub use batch::{
    BatchConfig, BatchError, BatchOutcome, BatchPlan, BatchSummary, MalformedLinePolicy,
    RecoveryOrder, load_recovery, plan_batch, run_batch,
};
pub use delivery::{DeliveryRecord, DeliveryReport, Period, Sink};
pub use log_file::{EventLog, LogError};
pub use normalize::{NormalizePolicy, NormalizedInterval, PolicyError};
pub use reducer::{RawInterval, reduce};
pub use transition::{LogLine, ParseError, TimerState, TransitionEvent, parse_line};
