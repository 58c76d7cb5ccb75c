// src/journal.rs

//! Journal (§4.9): a line-delimited, JSON-per-line structured log,
//! partitioned by UTC date under `<root>/.chameleon/journal/<YYYY-MM-DD>.log`.
//! Entries are never modified after being written.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A free-form detail value. Modeled as a tagged variant (§9 "Replacing
/// dynamic type shuttling") rather than an opaque `serde_json::Value`, so
/// callers can't accidentally stash nested structures into what is meant to
/// be a flat key/value bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DetailValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        DetailValue::String(s.to_string())
    }
}
impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        DetailValue::String(s)
    }
}
impl From<i64> for DetailValue {
    fn from(n: i64) -> Self {
        DetailValue::Number(n as f64)
    }
}
impl From<u64> for DetailValue {
    fn from(n: u64) -> Self {
        DetailValue::Number(n as f64)
    }
}
impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        DetailValue::Bool(b)
    }
}

pub type Details = BTreeMap<String, DetailValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: String,
    pub action: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Details,
}

/// The Journal, rooted at `<working_dir>/.chameleon/journal`.
pub struct Journal {
    root: PathBuf,
}

impl Journal {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            root: working_dir.as_ref().join(".chameleon").join("journal"),
        }
    }

    fn day_path(&self, date: &str) -> PathBuf {
        self.root.join(format!("{date}.log"))
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    fn append(&self, entry: &JournalEntry) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let date = entry.timestamp[..10].to_string();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_path(&date))?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Write a generic entry.
    pub fn log(&self, action: &str, status: &str, details: Details, err: Option<&str>) -> Result<()> {
        let entry = JournalEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            action: action.to_string(),
            status: status.to_string(),
            duration_ms: None,
            error: err.map(str::to_string),
            details,
        };
        self.append(&entry)
    }

    /// Write a failure entry for `action`.
    pub fn log_error(&self, action: &str, err: &str, details: Details) -> Result<()> {
        self.log(action, "error", details, Some(err))
    }

    /// Write a migration-specific entry (`action = "migrate"`).
    pub fn log_migration(
        &self,
        version: &str,
        status: &str,
        duration_ms: Option<u64>,
        note: Option<&str>,
        mut details: Details,
    ) -> Result<()> {
        details.insert("version".to_string(), version.into());
        if let Some(note) = note {
            details.insert("note".to_string(), note.into());
        }
        let entry = JournalEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            action: "migrate".to_string(),
            status: status.to_string(),
            duration_ms,
            error: None,
            details,
        };
        self.append(&entry)
    }

    /// Every partition file, sorted newest-first by filename (dates sort
    /// lexicographically).
    fn day_files_newest_first(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "log").unwrap_or(false))
            .collect();
        files.sort();
        files.reverse();
        files
    }

    fn read_day(&self, path: &Path) -> Vec<JournalEntry> {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// The most recent `n` entries, reading partitions from newest to
    /// oldest and stopping once `n` are collected.
    pub fn last(&self, n: usize) -> Vec<JournalEntry> {
        let mut collected: Vec<JournalEntry> = Vec::new();
        for path in self.day_files_newest_first() {
            let mut day = self.read_day(&path);
            day.reverse();
            for entry in day {
                collected.push(entry);
                if collected.len() >= n {
                    return collected;
                }
            }
        }
        collected
    }

    /// Today's failures (`status == "error"`).
    pub fn errors(&self) -> Vec<JournalEntry> {
        let path = self.day_path(&Self::today());
        self.read_day(&path)
            .into_iter()
            .filter(|e| e.status == "error")
            .collect()
    }

    /// All migration entries (`action == "migrate"`) across every partition.
    pub fn migrations(&self) -> Vec<JournalEntry> {
        let mut out = Vec::new();
        let mut files = self.day_files_newest_first();
        files.reverse(); // oldest first for a readable history
        for path in files {
            out.extend(
                self.read_day(&path)
                    .into_iter()
                    .filter(|e| e.action == "migrate"),
            );
        }
        out
    }
}
