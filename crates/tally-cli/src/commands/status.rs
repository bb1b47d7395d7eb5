//! Status command for showing pending transitions and queued retries.

use std::io::Write;

use anyhow::{Context, Result};

use tally_core::batch::count_transitions;
use tally_core::plan_batch;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let primary = config.primary_log();
    let recovery = config.recovery_log();

    let pending = count_transitions(&primary)
        .with_context(|| format!("failed to read {}", primary.path().display()))?;
    let queued = count_transitions(&recovery)
        .with_context(|| format!("failed to read {}", recovery.path().display()))?;
    let plan = plan_batch(&primary, &recovery, &config.batch_config()?)
        .context("failed to read transition logs")?;

    writeln!(writer, "Tally status")?;
    writeln!(
        writer,
        "Transition log: {} ({pending} pending)",
        primary.path().display()
    )?;
    writeln!(
        writer,
        "Recovery log:   {} ({queued} queued for retry)",
        recovery.path().display()
    )?;
    match plan.open_since {
        Some(since) => writeln!(writer, "Timer:          working since {}", since.to_rfc3339())?,
        None => writeln!(writer, "Timer:          stopped")?,
    }
    writeln!(writer, "Ready to sync:  {}", plan.periods.len())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn status_reports_counts_and_open_timer() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            log_path: temp.path().join("transitions.jsonl"),
            recovery_log_path: temp.path().join("recovery.jsonl"),
            ..Config::default()
        };
        fs::write(
            &config.log_path,
            concat!(
                r#"{"fromState":"idle","toState":"work","timestamp":"2025-01-29T12:00:00Z","type":"transition"}"#,
                "\n",
                r#"{"fromState":"work","toState":"rest","timestamp":"2025-01-29T12:25:00Z","type":"transition"}"#,
                "\n",
                r#"{"fromState":"rest","toState":"work","timestamp":"2025-01-29T12:30:00Z","type":"transition"}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut out = Vec::new();
        run(&mut out, &config).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("(3 pending)"));
        assert!(text.contains("(0 queued for retry)"));
        assert!(text.contains("working since 2025-01-29T12:30:00+00:00"));
        assert!(text.contains("Ready to sync:  1"));
    }

    #[test]
    fn status_with_no_logs() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            log_path: temp.path().join("transitions.jsonl"),
            recovery_log_path: temp.path().join("recovery.jsonl"),
            ..Config::default()
        };

        let mut out = Vec::new();
        run(&mut out, &config).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("(0 pending)"));
        assert!(text.contains("Timer:          stopped"));
    }
}
