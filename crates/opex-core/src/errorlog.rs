//! Validation error log.
//!
//! Bundles that fail validation are recorded as one line each in
//! `validation_error_log.txt` at the project root, in the form
//! `<kind label> | Directory: <bundle name>`. Later stages load the log
//! and skip the named bundles by exact name, so a logged `bag_1` does
//! not shadow a healthy `bag_12`. The file is plain text on purpose:
//! operators delete lines once a bundle is redelivered.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

/// Name of the error log at the project root.
pub const ERROR_LOG_FILE: &str = "validation_error_log.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Fixity mismatch, untracked payload, or unsupported manifest.
    ValidationFailed,
    /// Bundle bookkeeping is incomplete; the unpack never finished.
    Interrupted,
    /// An I/O failure prevented checking the bundle at all.
    RuntimeError,
}

impl ValidationErrorKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Bundle Validation Error",
            Self::Interrupted => "Bundle Interrupted Error",
            Self::RuntimeError => "Runtime Error",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Bundle Validation Error" => Some(Self::ValidationFailed),
            "Bundle Interrupted Error" => Some(Self::Interrupted),
            "Runtime Error" => Some(Self::RuntimeError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub kind: ValidationErrorKind,
    pub bundle_id: String,
}

/// Parsed view of the error log. Absent file reads as empty.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<ErrorLogEntry>,
}

impl ErrorLog {
    /// Parse the log under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(root: &Path) -> io::Result<Self> {
        let path = root.join(ERROR_LOG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err),
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => entries.push(entry),
                None => warn!(line, "unparseable error log line, ignoring"),
            }
        }
        Ok(Self { entries })
    }

    /// Whether `bundle_id` is logged, by exact name.
    #[must_use]
    pub fn contains(&self, bundle_id: &str) -> bool {
        self.entries.iter().any(|e| e.bundle_id == bundle_id)
    }

    #[must_use]
    pub fn entries(&self) -> &[ErrorLogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Option<ErrorLogEntry> {
    let (label, bundle_id) = line.split_once(" | Directory: ")?;
    let kind = ValidationErrorKind::from_label(label.trim())?;
    let bundle_id = bundle_id.trim();
    if bundle_id.is_empty() {
        return None;
    }
    Some(ErrorLogEntry {
        kind,
        bundle_id: bundle_id.to_string(),
    })
}

/// Append one entry to the log, creating it on first use.
///
/// # Errors
///
/// Returns an error if the log cannot be opened or written.
pub fn append(root: &Path, kind: ValidationErrorKind, bundle_id: &str) -> io::Result<()> {
    let path = root.join(ERROR_LOG_FILE);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{} | Directory: {bundle_id}", kind.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_log_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = ErrorLog::load(dir.path()).unwrap();
        assert!(log.is_empty());
        assert!(!log.contains("bag_1"));
    }

    #[test]
    fn append_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        append(dir.path(), ValidationErrorKind::ValidationFailed, "bag_1").unwrap();
        append(dir.path(), ValidationErrorKind::Interrupted, "bag_7").unwrap();
        append(dir.path(), ValidationErrorKind::RuntimeError, "bag_9").unwrap();

        let log = ErrorLog::load(dir.path()).unwrap();
        assert_eq!(log.entries().len(), 3);
        assert_eq!(
            log.entries()[0],
            ErrorLogEntry {
                kind: ValidationErrorKind::ValidationFailed,
                bundle_id: "bag_1".to_string(),
            }
        );
        assert!(log.contains("bag_7"));
        assert!(log.contains("bag_9"));
    }

    #[test]
    fn membership_is_exact_name_not_prefix() {
        let dir = TempDir::new().unwrap();
        append(dir.path(), ValidationErrorKind::ValidationFailed, "bag_1").unwrap();

        let log = ErrorLog::load(dir.path()).unwrap();
        assert!(log.contains("bag_1"));
        assert!(!log.contains("bag_12"));
        assert!(!log.contains("bag_"));
    }

    #[test]
    fn unparseable_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ERROR_LOG_FILE),
            "garbage without separator\nUnknown Kind | Directory: bag_2\nBundle Validation Error | Directory: bag_3\n",
        )
        .unwrap();

        let log = ErrorLog::load(dir.path()).unwrap();
        assert_eq!(log.entries().len(), 1);
        assert!(log.contains("bag_3"));
        assert!(!log.contains("bag_2"));
    }

    #[test]
    fn labels_match_the_wire_format() {
        assert_eq!(
            ValidationErrorKind::ValidationFailed.label(),
            "Bundle Validation Error"
        );
        assert_eq!(
            ValidationErrorKind::Interrupted.label(),
            "Bundle Interrupted Error"
        );
        assert_eq!(ValidationErrorKind::RuntimeError.label(), "Runtime Error");
    }
}
