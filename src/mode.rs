// src/mode.rs

//! Mode Registry & Mode Auth (§4.3): the paranoid-mode state machine that
//! gates schema-mutating operations, and the salted-hash verifier that
//! gates upward transitions.

use crate::error::{Error, ModeDeniedReason, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::IsTerminal;
use tracing::{info, warn};

/// The four canonical authorization states, in ascending rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Readonly,
    Standard,
    Privileged,
    Emergency,
}

impl Mode {
    pub fn rank(self) -> u8 {
        match self {
            Mode::Readonly => 0,
            Mode::Standard => 1,
            Mode::Privileged => 2,
            Mode::Emergency => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Readonly => "readonly",
            Mode::Standard => "standard",
            Mode::Privileged => "privileged",
            Mode::Emergency => "emergency",
        }
    }

    /// Lowercase + trim, with `admin` normalized to `privileged`. Any other
    /// string is invalid.
    pub fn canonicalize(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "readonly" => Ok(Mode::Readonly),
            "standard" => Ok(Mode::Standard),
            "privileged" => Ok(Mode::Privileged),
            "admin" => Ok(Mode::Privileged),
            "emergency" => Ok(Mode::Emergency),
            other => Err(Error::ModeDenied(ModeDeniedReason::InvalidMode)).map_err(|e| {
                warn!(raw = other, "rejected invalid mode string");
                e
            }),
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Readonly
    }
}

/// The on-disk `mode.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModeConfig {
    pub mode: Mode,
}

/// The on-disk `mode_auth.json`: a salted-hash password verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeAuthConfig {
    /// Hex-encoded 16-byte salt.
    pub salt: String,
    /// `SHA-256(salt || ":" || password)`, hex-encoded.
    pub hash: String,
}

const MIN_PASSWORD_LEN: usize = 8;

impl ModeAuthConfig {
    /// Derive a fresh verifier for `password`. Fails if the trimmed password
    /// is shorter than the minimum length.
    pub fn new(password: &str) -> Result<Self> {
        let trimmed = password.trim();
        if trimmed.len() < MIN_PASSWORD_LEN {
            return Err(Error::Auth(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex_encode(&salt_bytes);
        let hash = Self::digest(&salt, trimmed);
        Ok(Self { salt, hash })
    }

    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Constant-time verification of `password` against this verifier.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = Self::digest(&self.salt, password.trim());
        constant_time_eq(candidate.as_bytes(), self.hash.as_bytes())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Supplies a password for an upward mode transition when no password is
/// available via `CHAMELEON_MODE_PASSWORD`. The CLI shell's terminal prompt
/// is the concrete implementation injected here; the CORE only depends on
/// this trait (§1 "interactive prompts" are an out-of-scope collaborator).
pub trait PasswordPrompt {
    fn prompt(&self) -> Result<String>;
}

/// Reads a password from the controlling terminal. Fails immediately if
/// stdin is not a TTY, per §5 "no timeout; explicit error if stdin is not a
/// TTY and `CHAMELEON_MODE_PASSWORD` is unset".
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self) -> Result<String> {
        if !std::io::stdin().is_terminal() {
            return Err(Error::Auth(
                "no CHAMELEON_MODE_PASSWORD set and stdin is not a terminal".into(),
            ));
        }
        rpassword::prompt_password("mode password: ")
            .map_err(|e| Error::Auth(format!("failed to read password: {e}")))
    }
}

/// Resolve the password for an upward transition: environment variable
/// first, interactive terminal fallback.
pub fn resolve_password(prompt: &dyn PasswordPrompt) -> Result<String> {
    if let Ok(pw) = std::env::var("CHAMELEON_MODE_PASSWORD") {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    prompt.prompt()
}

/// Outcome of a requested mode transition, for journal/integrity-log
/// reporting by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeTransitionOutcome {
    Applied { mode: Mode },
    Denied(ModeDeniedReason),
}

/// Evaluate and, if authorized, apply a transition from `current` to
/// `target_raw`. Every attempt is the caller's responsibility to journal;
/// this function only decides and performs the write.
///
/// Downgrades and same-rank transitions never require a password. Upward
/// transitions require a configured `ModeAuthConfig` and a password that
/// verifies against it.
pub fn request_transition(
    store: &crate::vault::Store,
    current: Mode,
    target_raw: &str,
    prompt: &dyn PasswordPrompt,
) -> Result<ModeTransitionOutcome> {
    let target = match Mode::canonicalize(target_raw) {
        Ok(m) => m,
        Err(_) => return Ok(ModeTransitionOutcome::Denied(ModeDeniedReason::InvalidMode)),
    };

    if target.rank() > current.rank() {
        let Some(auth) = store.load_mode_auth()? else {
            return Ok(ModeTransitionOutcome::Denied(ModeDeniedReason::NotConfigured));
        };
        let password = resolve_password(prompt)?;
        if !auth.verify(&password) {
            return Ok(ModeTransitionOutcome::Denied(ModeDeniedReason::InvalidPassword));
        }
    }

    store.save_mode_config(&ModeConfig { mode: target })?;
    sync_legacy_field(store, target)?;
    info!(mode = target.as_str(), "mode transition applied");
    Ok(ModeTransitionOutcome::Applied { mode: target })
}

/// Keep the manifest's legacy `paranoid_mode` field in sync, per §9.
fn sync_legacy_field(store: &crate::vault::Store, mode: Mode) -> Result<()> {
    let mut manifest = store.load_manifest()?;
    manifest.paranoid_mode = mode.as_str().to_string();
    store.save_manifest(&manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPrompt(&'static str);
    impl PasswordPrompt for FixedPrompt {
        fn prompt(&self) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn canonicalize_normalizes_admin_and_case() {
        assert_eq!(Mode::canonicalize("ADMIN").unwrap(), Mode::Privileged);
        assert_eq!(Mode::canonicalize("  standard  ").unwrap(), Mode::Standard);
        assert!(Mode::canonicalize("bogus").is_err());
    }

    #[test]
    fn verifier_round_trips_and_rejects_wrong_password() {
        let auth = ModeAuthConfig::new("correcthorse").unwrap();
        assert!(auth.verify("correcthorse"));
        assert!(!auth.verify("wrong"));
    }

    #[test]
    fn verifier_rejects_short_password() {
        assert!(ModeAuthConfig::new("short").is_err());
    }

    #[test]
    fn downgrade_never_requires_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::vault::Store::new(dir.path());
        store.initialize().unwrap();
        // No mode_auth configured at all.
        let outcome = request_transition(&store, Mode::Privileged, "standard", &FixedPrompt(""))
            .unwrap();
        assert_eq!(outcome, ModeTransitionOutcome::Applied { mode: Mode::Standard });
    }

    #[test]
    fn escalation_without_auth_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::vault::Store::new(dir.path());
        store.initialize().unwrap();
        let outcome = request_transition(&store, Mode::Readonly, "standard", &FixedPrompt(""))
            .unwrap();
        assert_eq!(
            outcome,
            ModeTransitionOutcome::Denied(ModeDeniedReason::NotConfigured)
        );
    }

    #[test]
    fn escalation_with_correct_password_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::vault::Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_auth(&ModeAuthConfig::new("correcthorse").unwrap())
            .unwrap();

        let outcome =
            request_transition(&store, Mode::Readonly, "standard", &FixedPrompt("correcthorse"))
                .unwrap();
        assert_eq!(outcome, ModeTransitionOutcome::Applied { mode: Mode::Standard });
    }

    #[test]
    fn escalation_with_wrong_password_is_denied_and_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::vault::Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_auth(&ModeAuthConfig::new("correcthorse").unwrap())
            .unwrap();

        let outcome = request_transition(&store, Mode::Readonly, "standard", &FixedPrompt("wrong"))
            .unwrap();
        assert_eq!(
            outcome,
            ModeTransitionOutcome::Denied(ModeDeniedReason::InvalidPassword)
        );
        assert_eq!(store.load_mode_config().unwrap().mode, Mode::Readonly);
    }
}
