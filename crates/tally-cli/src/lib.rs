//! Tally CLI library.
//!
//! This crate provides the CLI interface for delivering timer work periods.

mod cli;
pub mod commands;
mod config;
mod sink;

pub use cli::{Cli, Commands};
pub use config::{Config, ConfigError, NotionCredentials};
pub use sink::NotionSink;
