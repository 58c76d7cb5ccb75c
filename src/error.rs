// src/error.rs

use thiserror::Error;

/// Core error types for ChameleonDB
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest/journal (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file (de)serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Postgres connection/execution errors
    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// `.chameleon.yml` could not be read or is structurally invalid
    #[error("Config error: {0}")]
    Config(String),

    /// A schema file could not be read
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    /// The merger was given an unusable set of schema files
    #[error("Schema merge error: {0}")]
    SchemaMerge(String),

    /// The external parser rejected the merged schema
    #[error("Parse error at {location}: {message}")]
    Parse {
        location: String,
        message: String,
        snippet: Option<String>,
        suggestion: Option<String>,
    },

    /// `VerifyIntegrity` found one or more tamper indicators
    #[error("Integrity violation: {0:?}")]
    IntegrityViolation(Vec<String>),

    /// A mode transition was refused
    #[error("Mode change denied: {0}")]
    ModeDenied(ModeDeniedReason),

    /// A password could not be obtained
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The vault's on-disk state is internally inconsistent
    #[error("Vault state error: {0}")]
    VaultState(String),

    /// Connecting to the database failed or timed out
    #[error("Database connect error: {0}")]
    DatabaseConnect(String),

    /// Executing DDL against the database failed
    #[error("Database exec error: {0}")]
    DatabaseExec(String),

    /// The State Tracker could not persist a migration record
    #[error("State persistence error: {0}")]
    StatePersistence(String),
}

/// Reasons a mode escalation or change can be denied, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeDeniedReason {
    NotConfigured,
    InvalidPassword,
    ReadonlyLock,
    InvalidMode,
}

impl std::fmt::Display for ModeDeniedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModeDeniedReason::NotConfigured => "not_configured",
            ModeDeniedReason::InvalidPassword => "invalid_password",
            ModeDeniedReason::ReadonlyLock => "readonly_lock",
            ModeDeniedReason::InvalidMode => "invalid_mode",
        };
        write!(f, "{s}")
    }
}

/// Result type alias using ChameleonDB's Error type
pub type Result<T> = std::result::Result<T, Error>;
