// src/vault/engine.rs

//! Vault Engine (§4.7): registration and change detection. Orchestrates
//! the Hasher and Vault Store; the Migration Orchestrator is this module's
//! client.

use super::models::VersionEntry;
use super::{build_entry, Store};
use crate::error::Result;
use crate::hash::hash_bytes;
use std::path::Path;
use tracing::info;

/// `DetectChanges` (§4.7): compare the hash of the file at `merged_schema_path`
/// against the current version's hash.
///
/// Returns `(true, "Initial schema")` if there is no vault or no current
/// version yet, `(false, "")` if unchanged, `(true, "Schema modified")`
/// otherwise.
pub fn detect_changes(store: &Store, merged_schema_path: &Path) -> Result<(bool, String)> {
    if !store.exists() {
        return Ok((true, "Initial schema".to_string()));
    }
    let manifest = store.load_manifest()?;
    let Some(current) = manifest.current_entry() else {
        return Ok((true, "Initial schema".to_string()));
    };

    let bytes = std::fs::read(merged_schema_path)?;
    let hash = hash_bytes(&bytes);
    if hash == current.hash {
        Ok((false, String::new()))
    } else {
        Ok((true, "Schema modified".to_string()))
    }
}

/// `RegisterVersion` (§4.7). Auto-initializes the vault if it does not yet
/// exist. Idempotent by content hash: registering the same bytes twice in a
/// row returns the existing entry rather than creating a new one.
pub fn register_version(
    store: &Store,
    path: &Path,
    author: &str,
    summary: &str,
) -> Result<VersionEntry> {
    if !store.exists() {
        store.initialize()?;
    }

    let mut manifest = store.load_manifest()?;
    let bytes = std::fs::read(path)?;
    let hash = hash_bytes(&bytes);

    if let Some(current) = manifest.current_entry() {
        if current.hash == hash {
            return Ok(current.clone());
        }
    }

    let version = manifest.next_version();
    let parent = if manifest.current_version.is_empty() {
        None
    } else {
        Some(manifest.current_version.clone())
    };

    let entry = build_entry(
        version.clone(),
        hash.clone(),
        author.to_string(),
        parent.clone(),
        summary.to_string(),
        vec![path.display().to_string()],
    );

    // Snapshot and hash file are written before the manifest, so a visible
    // `current_version` always has its files on disk (§4.7, §9).
    store.save_version(&version, &bytes, &hash)?;

    manifest.versions.push(entry.clone());
    manifest.current_version = version.clone();
    store.save_manifest(&manifest)?;

    let short_hash: String = hash.chars().take(12).collect();
    store.append_log(
        "REGISTER",
        Some(&version),
        &[
            ("hash", short_hash),
            ("parent", parent.unwrap_or_else(|| "none".to_string())),
            ("changes", summary.to_string()),
        ],
    )?;

    info!(version = %version, "registered new schema version");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_schema(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("schema.merged.cham");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn first_register_creates_v001_with_no_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let schema = write_schema(dir.path(), "entity User { id: uuid primary }");

        let entry = register_version(&store, &schema, "alice", "Initial schema").unwrap();
        assert_eq!(entry.version, "v001");
        assert_eq!(entry.parent, None);
        assert!(entry.locked);

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.current_version, "v001");
        assert_eq!(manifest.versions.len(), 1);
    }

    #[test]
    fn second_register_with_different_content_chains_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let schema = write_schema(dir.path(), "entity User { id: uuid primary }");
        register_version(&store, &schema, "alice", "Initial schema").unwrap();

        write_schema(dir.path(), "entity User { id: uuid primary, email: string }");
        let entry = register_version(&store, &schema, "alice", "Added email").unwrap();

        assert_eq!(entry.version, "v002");
        assert_eq!(entry.parent, Some("v001".to_string()));

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 2);
        assert_eq!(manifest.current_version, "v002");
    }

    #[test]
    fn registering_identical_content_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let schema = write_schema(dir.path(), "entity User { id: uuid primary }");

        let first = register_version(&store, &schema, "alice", "Initial schema").unwrap();
        let second = register_version(&store, &schema, "alice", "Initial schema").unwrap();

        assert_eq!(first, second);
        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1);
    }

    #[test]
    fn detect_changes_reports_initial_schema_with_no_vault() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let schema = write_schema(dir.path(), "entity User {}");

        let (changed, summary) = detect_changes(&store, &schema).unwrap();
        assert!(changed);
        assert_eq!(summary, "Initial schema");
    }

    #[test]
    fn detect_changes_reports_unchanged_after_register() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let schema = write_schema(dir.path(), "entity User {}");
        register_version(&store, &schema, "alice", "Initial schema").unwrap();

        let (changed, summary) = detect_changes(&store, &schema).unwrap();
        assert!(!changed);
        assert_eq!(summary, "");
    }
}
