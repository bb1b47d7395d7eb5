//! Preview command: show what `tally sync` would deliver without delivering.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use tally_core::{DeliveryRecord, RawInterval, plan_batch};

use crate::Config;

#[derive(Debug, Serialize)]
struct PreviewEntry {
    title: String,
    start: String,
    end: String,
    raw: RawInterval,
}

pub fn run<W: Write>(writer: &mut W, config: &Config, json: bool) -> Result<()> {
    let batch = config.batch_config()?;
    let plan = plan_batch(&config.primary_log(), &config.recovery_log(), &batch)
        .context("failed to read transition logs")?;

    let entries: Vec<_> = plan
        .periods
        .iter()
        .map(|period| {
            let DeliveryRecord { title, start, end } = period.record();
            PreviewEntry {
                title,
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
                raw: period.raw,
            }
        })
        .collect();

    if json {
        let output = serde_json::json!({
            "periods": entries,
            "discarded": plan.discarded,
            "skipped_lines": plan.skipped_lines,
            "in_progress_since": plan.open_since.map(|t| t.to_rfc3339()),
        });
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No periods to deliver.")?;
    }
    for entry in &entries {
        writeln!(writer, "{}  {} -> {}", entry.title, entry.start, entry.end)?;
    }
    if plan.discarded > 0 {
        writeln!(writer, "{} interval(s) too short to report", plan.discarded)?;
    }
    if let Some(since) = plan.open_since {
        writeln!(
            writer,
            "Timer running since {}; sync will wait for it to stop",
            since.to_rfc3339()
        )?;
    }

    Ok(())
}
