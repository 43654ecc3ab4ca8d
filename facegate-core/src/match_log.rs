use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `2024-03-01 09:15:02.123456`, the same shape as a naive local datetime
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Error)]
#[error("Failed to append to match log {path}: {source}")]
pub struct MatchLogError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// One successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub name: String,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.timestamp.format(TIMESTAMP_FORMAT))
    }
}

/// Append-only plaintext record of successful logins.
#[derive(Debug, Clone)]
pub struct MatchLog {
    path: PathBuf,
}

impl MatchLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `<name> <timestamp>` as a single line.
    ///
    /// The line is formatted up front and handed to one `write_all` on an
    /// `O_APPEND` handle.
    pub fn append(&self, name: &str, timestamp: DateTime<Local>) -> Result<LogEntry, MatchLogError> {
        let entry = LogEntry {
            name: name.to_string(),
            timestamp,
        };
        let line = format!("{}\n", entry);

        let wrap = |source| MatchLogError {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(wrap)?;
        file.write_all(line.as_bytes()).map_err(wrap)?;

        log::debug!("Match logged: {}", line.trim_end());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};

    #[test]
    fn test_line_format() {
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 9, 15, 2).unwrap();
        let entry = LogEntry {
            name: "alice".to_string(),
            timestamp: ts,
        };
        assert_eq!(entry.to_string(), "alice 2024-03-01 09:15:02.000000");
    }

    #[test]
    fn test_append_creates_and_accumulates() {
        let tmp = tempfile::tempdir().unwrap();
        let log = MatchLog::new(tmp.path().join("logs").join("log.txt"));

        log.append("alice", Local::now()).unwrap();
        log.append("bob", Local::now()).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("alice "));
        assert!(lines[1].starts_with("bob "));

        let (_, ts) = lines[1].split_once(' ').unwrap();
        assert!(NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_unwritable_path_errors() {
        let tmp = tempfile::tempdir().unwrap();
        // The log path is a directory, so opening it for append fails
        let log = MatchLog::new(tmp.path());
        assert!(log.append("alice", Local::now()).is_err());
    }
}
