// src/vault/mod.rs

//! Vault Store: owns the on-disk layout of the Schema Vault and presents
//! typed read/write operations over it.
//!
//! ```text
//! <root>/.chameleon/vault/
//!   manifest.json
//!   mode.json
//!   mode_auth.json           (0600; optional)
//!   integrity.log
//!   versions/vNNN.json       (snapshot bytes, verbatim)
//!   hashes/vNNN.hash         (64 hex chars)
//! ```
//!
//! Save operations rewrite the whole file; callers are responsible for
//! ordering writes so that a crash never leaves a manifest that points at
//! missing artifacts (§4.7, §9). `Manifest`/`ModeConfig` saves use a
//! temp-file-then-rename so a reader never observes a truncated file.

pub mod engine;
pub mod integrity;
pub mod models;

use crate::error::{Error, Result};
use crate::mode::{ModeAuthConfig, ModeConfig};
use models::{Manifest, VersionEntry};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// The Vault Store, rooted at `<working_dir>/.chameleon/vault`.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Construct a store rooted at `working_dir/.chameleon/vault`.
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            root: working_dir.as_ref().join(".chameleon").join("vault"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    fn mode_path(&self) -> PathBuf {
        self.root.join("mode.json")
    }

    fn mode_auth_path(&self) -> PathBuf {
        self.root.join("mode_auth.json")
    }

    fn integrity_log_path(&self) -> PathBuf {
        self.root.join("integrity.log")
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    fn hashes_dir(&self) -> PathBuf {
        self.root.join("hashes")
    }

    fn version_path(&self, version: &str) -> PathBuf {
        self.versions_dir().join(format!("{version}.json"))
    }

    fn hash_path(&self, version: &str) -> PathBuf {
        self.hashes_dir().join(format!("{version}.hash"))
    }

    /// True iff the manifest file is readable.
    pub fn exists(&self) -> bool {
        self.manifest_path().is_file()
    }

    /// Create the directory tree and an empty manifest/mode config, then
    /// append an `INIT` line to the integrity log.
    ///
    /// Fails if the directory tree exists but lacks a manifest (a half
    /// formed vault is left for an operator to inspect, not silently
    /// clobbered).
    pub fn initialize(&self) -> Result<()> {
        if self.root.is_dir() && !self.exists() {
            return Err(Error::VaultState(format!(
                "vault directory {} exists but has no manifest.json",
                self.root.display()
            )));
        }
        if self.exists() {
            return Ok(());
        }

        debug!("initializing vault at {}", self.root.display());
        create_dir_mode(&self.versions_dir())?;
        create_dir_mode(&self.hashes_dir())?;

        self.save_manifest(&Manifest::empty())?;
        self.save_mode_config(&ModeConfig::default())?;
        // integrity.log starts empty; append happens below via append_log.
        if !self.integrity_log_path().exists() {
            File::create(self.integrity_log_path())?;
        }
        self.append_log("INIT", None, &[])?;

        info!("vault initialized at {}", self.root.display());
        Ok(())
    }

    /// Load the manifest. Returns `VaultState` if missing or corrupt.
    pub fn load_manifest(&self) -> Result<Manifest> {
        let bytes = fs::read(self.manifest_path()).map_err(|e| {
            Error::VaultState(format!("failed to read manifest.json: {e}"))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::VaultState(format!("corrupt manifest.json: {e}")))?;
        Ok(manifest)
    }

    /// Rewrite the manifest in full, pretty-printed, via temp-file-then-rename
    /// so a reader never observes a truncated file.
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let body = serde_json::to_vec_pretty(manifest)?;
        atomic_write(&self.manifest_path(), &body)
    }

    /// Write the merged-schema snapshot and its hash file. Both files are
    /// written mode 0644. The caller is responsible for computing `hash`
    /// from `bytes` beforehand.
    pub fn save_version(&self, version: &str, bytes: &[u8], hash: &str) -> Result<()> {
        let version_path = self.version_path(version);
        let hash_path = self.hash_path(version);

        write_file_mode(&version_path, bytes, 0o644)?;
        write_file_mode(&hash_path, hash.as_bytes(), 0o644)?;
        Ok(())
    }

    /// Read back the snapshot bytes for `version`.
    pub fn load_snapshot(&self, version: &str) -> Result<Vec<u8>> {
        fs::read(self.version_path(version))
            .map_err(|e| Error::VaultState(format!("missing snapshot for {version}: {e}")))
    }

    /// Read back the hash-file contents for `version`, trimmed of whitespace.
    pub fn load_hash_file(&self, version: &str) -> Result<String> {
        let text = fs::read_to_string(self.hash_path(version))
            .map_err(|e| Error::VaultState(format!("missing hash file for {version}: {e}")))?;
        Ok(text.trim().to_string())
    }

    pub fn snapshot_exists(&self, version: &str) -> bool {
        self.version_path(version).is_file()
    }

    pub fn hash_file_exists(&self, version: &str) -> bool {
        self.hash_path(version).is_file()
    }

    /// Append one line to the integrity log. Open-append-close; never
    /// truncates (§4.2, invariant §3.5).
    pub fn append_log(&self, action: &str, version: Option<&str>, details: &[(&str, String)]) -> Result<()> {
        let mut line = format!(
            "{} [{}]",
            chrono::Utc::now().to_rfc3339(),
            action
        );
        if let Some(v) = version {
            line.push_str(&format!(" [version={v}]"));
        }
        for (k, v) in details {
            line.push_str(&format!(" {k}={v}"));
        }
        line.push('\n');

        use std::fs::OpenOptions;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.integrity_log_path())?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read the whole integrity log (used by `verify` diagnostics and tests).
    pub fn read_log(&self) -> Result<String> {
        Ok(fs::read_to_string(self.integrity_log_path()).unwrap_or_default())
    }

    /// Read the current mode config, applying §4.3's legacy-fallback rule:
    /// if `mode.json` is missing but the manifest carries a nonempty
    /// `paranoid_mode`, normalize and persist it; otherwise default to
    /// `readonly` and persist that.
    pub fn load_mode_config(&self) -> Result<ModeConfig> {
        if self.mode_path().is_file() {
            let bytes = fs::read(self.mode_path())?;
            let cfg: ModeConfig = serde_json::from_slice(&bytes)
                .map_err(|e| Error::VaultState(format!("corrupt mode.json: {e}")))?;
            return Ok(cfg);
        }

        let fallback = self
            .load_manifest()
            .ok()
            .and_then(|m| crate::mode::Mode::canonicalize(&m.paranoid_mode).ok());

        let mode = fallback.unwrap_or(crate::mode::Mode::Readonly);
        let cfg = ModeConfig { mode };
        self.save_mode_config(&cfg)?;
        Ok(cfg)
    }

    pub fn save_mode_config(&self, cfg: &ModeConfig) -> Result<()> {
        let body = serde_json::to_vec_pretty(cfg)?;
        atomic_write(&self.mode_path(), &body)
    }

    /// Mode-auth config, if one has been configured.
    pub fn load_mode_auth(&self) -> Result<Option<ModeAuthConfig>> {
        if !self.mode_auth_path().is_file() {
            return Ok(None);
        }
        let bytes = fs::read(self.mode_auth_path())?;
        let cfg: ModeAuthConfig = serde_json::from_slice(&bytes)
            .map_err(|e| Error::VaultState(format!("corrupt mode_auth.json: {e}")))?;
        Ok(Some(cfg))
    }

    /// Persist the mode-auth config, owner-only permissions (0600).
    pub fn save_mode_auth(&self, cfg: &ModeAuthConfig) -> Result<()> {
        let body = serde_json::to_vec_pretty(cfg)?;
        write_file_mode(&self.mode_auth_path(), &body, 0o600)
    }

    /// List version identifiers with on-disk snapshots, for diagnostics.
    pub fn list_version_ids(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.versions_dir()) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }
}

fn create_dir_mode(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

fn write_file_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    let _ = mode; // silence unused warning on non-unix targets
    Ok(())
}

/// Write `bytes` to a sibling temp file and rename it over `path`, which is
/// atomic on the same filesystem on POSIX (§9 "Atomicity of registration").
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Construct an entry to append to the manifest's `versions`.
pub fn build_entry(
    version: String,
    hash: String,
    author: String,
    parent: Option<String>,
    changes_summary: String,
    files: Vec<String>,
) -> VersionEntry {
    VersionEntry {
        version,
        hash,
        timestamp: chrono::Utc::now().to_rfc3339(),
        author,
        parent,
        locked: true,
        changes_summary,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        assert!(!store.exists());
        store.initialize().unwrap();
        assert!(store.exists());

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.current_version, "");
        assert!(manifest.versions.is_empty());

        let log = store.read_log().unwrap();
        assert!(log.contains("[INIT]"));
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store.initialize().unwrap();
        let log = store.read_log().unwrap();
        assert_eq!(log.matches("[INIT]").count(), 1);
    }

    #[test]
    fn save_and_load_version_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.initialize().unwrap();

        let bytes = b"entity User { id: uuid primary }";
        let hash = crate::hash::hash_bytes(bytes);
        store.save_version("v001", bytes, &hash).unwrap();

        assert_eq!(store.load_snapshot("v001").unwrap(), bytes);
        assert_eq!(store.load_hash_file("v001").unwrap(), hash);
    }

    #[test]
    fn append_log_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        let before = store.read_log().unwrap().len();
        store.append_log("REGISTER", Some("v001"), &[("hash", "abc123".into())]).unwrap();
        let after = store.read_log().unwrap().len();
        assert!(after > before);
    }
}
