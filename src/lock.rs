// src/lock.rs

//! Advisory locking on the vault directory (§9 "No concurrent migrator").
//! The design leaves this optional; this crate acquires it at the start of
//! any write command and releases it on drop, so two `chameleon migrate`
//! invocations against the same working directory fail fast instead of
//! racing to rewrite `manifest.json`.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

pub struct VaultLock {
    file: File,
    path: PathBuf,
}

impl VaultLock {
    /// Acquire an exclusive, non-blocking advisory lock on
    /// `<working_dir>/.chameleon/vault/manifest.json`, creating an empty
    /// placeholder file if the vault hasn't been initialized yet.
    pub fn acquire(working_dir: impl AsRef<Path>) -> Result<Self> {
        let vault_dir = working_dir.as_ref().join(".chameleon").join("vault");
        std::fs::create_dir_all(&vault_dir)?;
        let path = vault_dir.join(".lock");
        let file = File::create(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::VaultState(format!(
                "another chameleon process holds the lock on {}",
                vault_dir.display()
            ))
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_in_same_process_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = VaultLock::acquire(dir.path()).unwrap();
        let second = VaultLock::acquire(dir.path());
        assert!(second.is_err());
        drop(first);
        assert!(VaultLock::acquire(dir.path()).is_ok());
    }
}
