// src/state.rs

//! State Tracker (§3, §4.8): records applied/failed migrations with DDL
//! hash and status, kept separate from the vault so a failed DB apply never
//! mutates the vault's own ledger.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Applied,
    Failed,
    PendingMigration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStateEntry {
    pub version: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: MigrationStatus,
    pub schema_hash: String,
    pub ddl_hash: String,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
}

/// `<root>/.chameleon/state/migrations.json`: an append-in-memory,
/// rewrite-whole-file-on-disk log of migration attempts, one entry per
/// attempt (retries append a new entry rather than mutating the old one,
/// matching the Journal's append-only spirit while staying a JSON array so
/// "last entry for a version" is a cheap scan).
pub struct StateTracker {
    path: PathBuf,
}

impl StateTracker {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            path: working_dir
                .as_ref()
                .join(".chameleon")
                .join("state")
                .join("migrations.json"),
        }
    }

    fn load(&self) -> Result<Vec<MigrationStateEntry>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, entries: &[MigrationStateEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }

    /// Append a new attempt record.
    pub fn record(&self, entry: MigrationStateEntry) -> Result<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        self.save(&entries)
    }

    /// The most recent entry across all versions, if any — used by the
    /// Orchestrator's `pendingUnapplied` check (§4.8 Phase D).
    pub fn last(&self) -> Result<Option<MigrationStateEntry>> {
        Ok(self.load()?.into_iter().last())
    }

    /// The most recent entry for a specific version, if any.
    pub fn last_for_version(&self, version: &str) -> Result<Option<MigrationStateEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|e| e.version == version)
            .last())
    }

    pub fn all(&self) -> Result<Vec<MigrationStateEntry>> {
        self.load()
    }
}
