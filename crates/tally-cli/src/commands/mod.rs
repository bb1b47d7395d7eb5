//! CLI subcommand implementations.

pub mod preview;
pub mod status;
pub mod sync;
