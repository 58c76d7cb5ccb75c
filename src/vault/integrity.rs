// src/vault/integrity.rs

//! Hasher-backed integrity verification (§4.4).

use super::Store;
use crate::hash::hash_bytes;
use serde::Serialize;

/// Outcome of `verify_integrity`. Never modifies any file.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub versions_ok: Vec<String>,
    pub versions_fail: Vec<String>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    fn missing_vault() -> Self {
        Self {
            valid: false,
            versions_ok: Vec::new(),
            versions_fail: Vec::new(),
            issues: vec!["vault does not exist".to_string()],
        }
    }
}

/// Walk the manifest's versions and confirm, for each, that the snapshot
/// and hash file exist and both equal `entry.hash`.
pub fn verify_integrity(store: &Store) -> crate::error::Result<IntegrityReport> {
    if !store.exists() {
        return Ok(IntegrityReport::missing_vault());
    }

    let manifest = store.load_manifest()?;
    let mut report = IntegrityReport {
        valid: true,
        versions_ok: Vec::new(),
        versions_fail: Vec::new(),
        issues: Vec::new(),
    };

    for entry in &manifest.versions {
        if let Some(issue) = check_one(store, &entry.version, &entry.hash) {
            report.valid = false;
            report.versions_fail.push(entry.version.clone());
            report.issues.push(issue);
        } else {
            report.versions_ok.push(entry.version.clone());
        }
    }

    Ok(report)
}

fn check_one(store: &Store, version: &str, expected_hash: &str) -> Option<String> {
    if !store.snapshot_exists(version) {
        return Some(format!("{version}: missing snapshot"));
    }
    if !store.hash_file_exists(version) {
        return Some(format!("{version}: missing hash file"));
    }

    let bytes = match store.load_snapshot(version) {
        Ok(b) => b,
        Err(e) => return Some(format!("{version}: failed to read snapshot: {e}")),
    };
    let stored_hash = match store.load_hash_file(version) {
        Ok(h) => h,
        Err(e) => return Some(format!("{version}: failed to read hash file: {e}")),
    };

    let computed = hash_bytes(&bytes);
    if computed != stored_hash || computed != expected_hash {
        return Some(format!(
            "{version}: hash mismatch (computed={computed}, stored={stored_hash}, manifest={expected_hash})"
        ));
    }

    None
}
