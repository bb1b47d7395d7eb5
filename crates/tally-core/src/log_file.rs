//! Newline-delimited log files: the primary transition log and the recovery log.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// I/O failure on a log file.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A JSONL file of transition lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every line. A missing file reads as empty.
    pub fn read_lines(&self) -> Result<Vec<String>, LogError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(LogError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Appends lines, creating the file (and its directory) if needed.
    pub fn append_lines(&self, lines: &[String]) -> Result<(), LogError> {
        if lines.is_empty() {
            return Ok(());
        }
        self.append_impl(lines).map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn append_impl(&self, lines: &[String]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Recovery pairs must land together, so the batch is one write.
        let mut buf = lines.join("\n");
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.sync_data()
    }

    /// Empties the file. A missing file is left missing.
    pub fn truncate(&self) -> Result<(), LogError> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LogError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let log = EventLog::new(temp.path().join("absent.jsonl"));
        assert!(log.read_lines().unwrap().is_empty());
        log.truncate().unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn append_creates_parent_and_keeps_order() {
        let temp = tempfile::tempdir().unwrap();
        let log = EventLog::new(temp.path().join("nested/recovery.jsonl"));

        log.append_lines(&["a".to_string(), "b".to_string()]).unwrap();
        log.append_lines(&["c".to_string()]).unwrap();

        assert_eq!(log.read_lines().unwrap(), vec!["a", "b", "c"]);
        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw, "a\nb\nc\n");
    }

    #[test]
    fn truncate_empties_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let log = EventLog::new(temp.path().join("log.jsonl"));
        log.append_lines(&["x".to_string()]).unwrap();

        log.truncate().unwrap();

        assert!(log.path().exists());
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn append_nothing_does_not_create_file() {
        let temp = tempfile::tempdir().unwrap();
        let log = EventLog::new(temp.path().join("log.jsonl"));
        log.append_lines(&[]).unwrap();
        assert!(!log.path().exists());
    }
}
