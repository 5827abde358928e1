//! Persisted sink for input that could not be ingested.
//!
//! One line per diverted item: `"<batch index>: <raw content> (<reason>)"`.
//! Problems with the input as a whole use `input` in place of an index.

use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::FusionResult;

/// One diverted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub batch_index: Option<usize>,
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch_index {
            Some(index) => write!(f, "{}: {} ({})", index, self.raw, self.reason),
            None => write!(f, "input: {} ({})", self.raw, self.reason),
        }
    }
}

/// Ordered collection of diverted items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item from a batch. `raw` is rendered as compact JSON.
    pub fn push(&mut self, batch_index: usize, raw: &serde_json::Value, reason: impl Into<String>) {
        self.entries.push(ErrorEntry {
            batch_index: Some(batch_index),
            raw: raw.to_string(),
            reason: reason.into(),
        });
    }

    /// Record a problem with the input as a whole.
    pub fn push_input(&mut self, raw: impl Into<String>, reason: impl Into<String>) {
        self.entries.push(ErrorEntry {
            batch_index: None,
            raw: raw.into(),
            reason: reason.into(),
        });
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append all entries to `path`, creating it if needed. Writes nothing for
    /// an empty log.
    pub fn append_to(&self, path: impl AsRef<Path>) -> FusionResult<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_format() {
        let mut log = ErrorLog::new();
        log.push(2, &json!({"a": 1}), "Not a list");
        log.push_input("null", "top level is not a list of batches");

        let lines: Vec<String> = log.entries().iter().map(ToString::to_string).collect();
        assert_eq!(lines[0], r#"2: {"a":1} (Not a list)"#);
        assert_eq!(lines[1], "input: null (top level is not a list of batches)");
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("errors.log");

        let mut log = ErrorLog::new();
        log.push(0, &json!("oops"), "Not a list");
        log.append_to(&path).unwrap();
        log.append_to(&path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.starts_with("0: \"oops\" (Not a list)"));
    }

    #[test]
    fn test_empty_log_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        ErrorLog::new().append_to(&path).unwrap();
        assert!(!path.exists());
    }
}
