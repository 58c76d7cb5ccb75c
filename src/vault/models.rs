// src/vault/models.rs

//! Data models for the Schema Vault's manifest: version entries and the
//! manifest that indexes them.

use serde::{Deserialize, Serialize};

/// An immutable record of one registered schema version.
///
/// Created once by the Vault Engine and never mutated or deleted
/// thereafter (§3 "Lifecycles").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionEntry {
    /// Monotone `vNNN` identifier, 1-indexed, zero-padded to 3 digits.
    pub version: String,
    /// Lowercase hex SHA-256 of the snapshot file bytes.
    pub hash: String,
    /// UTC timestamp, RFC3339.
    pub timestamp: String,
    /// Free-form author string, typically the OS user.
    pub author: String,
    /// Previous version in the chain; `None` only for `v001`.
    pub parent: Option<String>,
    /// Always `true` once registered.
    pub locked: bool,
    /// Human-readable summary of what changed.
    pub changes_summary: String,
    /// Source paths captured at registration time.
    pub files: Vec<String>,
}

impl VersionEntry {
    /// Format a 1-indexed ordinal as `vNNN`.
    pub fn format_version(ordinal: usize) -> String {
        format!("v{ordinal:03}")
    }

    /// Parse a version string like `v007` back into its ordinal.
    pub fn parse_ordinal(version: &str) -> Option<usize> {
        version.strip_prefix('v')?.parse().ok()
    }
}

/// The vault's index: an ordered list of version entries plus the pointer
/// to the current one and the legacy paranoid-mode field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub current_version: String,
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub paranoid_mode: String,
}

impl Manifest {
    /// A fresh, empty manifest as written by `Initialize` (§4.2).
    pub fn empty() -> Self {
        Self {
            current_version: String::new(),
            versions: Vec::new(),
            paranoid_mode: String::new(),
        }
    }

    /// The entry named by `current_version`, if any.
    pub fn current_entry(&self) -> Option<&VersionEntry> {
        if self.current_version.is_empty() {
            return None;
        }
        self.versions
            .iter()
            .find(|v| v.version == self.current_version)
    }

    /// Look up an entry by its `vNNN` identifier.
    pub fn find(&self, version: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// The version identifier the next registration should use.
    pub fn next_version(&self) -> String {
        VersionEntry::format_version(self.versions.len() + 1)
    }
}
