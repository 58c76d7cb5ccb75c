// src/config.rs

//! Configuration loading (§6): `.chameleon.yml` in the working directory
//! root, with `$VAR`/`${VAR}`/`env:VAR` interpolation for environment
//! references, plus the `DATABASE_URL` override.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub connection_string: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SchemaConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub merged_output: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub backup_on_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// The fully resolved configuration: env overrides applied, interpolation
/// done, ready for the Orchestrator to consume.
#[derive(Debug, Clone)]
pub struct Config {
    pub connection_string: String,
    pub schema_paths: Vec<String>,
    pub merged_output: Option<String>,
    pub backup_on_migrate: bool,
}

/// Load `.chameleon.yml` from `working_dir`, if present, and resolve it
/// into a `Config`. A missing file yields the all-defaults configuration.
pub fn load(working_dir: impl AsRef<Path>) -> Result<Config> {
    let path = working_dir.as_ref().join(".chameleon.yml");
    let raw: RawConfig = if path.is_file() {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid YAML in {}: {e}", path.display())))?
    } else {
        RawConfig::default()
    };

    let mut connection_string = interpolate(&raw.database.connection_string);
    if let Ok(db_url) = std::env::var("DATABASE_URL") {
        if !db_url.is_empty() {
            connection_string = db_url;
        }
    }

    Ok(Config {
        connection_string,
        schema_paths: raw.schema.paths,
        merged_output: raw.schema.merged_output,
        backup_on_migrate: raw.features.backup_on_migrate,
    })
}

/// Replace `$VAR`, `${VAR}`, and `env:VAR` references with the named
/// environment variable's value. An unset variable interpolates to the
/// empty string (SPEC_FULL.md §D.2): a missing piece of a DSN should fail
/// at connect time with a clear Postgres error, not at config-parse time
/// with an opaque one.
fn interpolate(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("env:") {
        return std::env::var(rest).unwrap_or_default();
    }

    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                let name: String = chars[i + 2..i + 2 + end].iter().collect();
                out.push_str(&std::env::var(&name).unwrap_or_default());
                i += 2 + end + 1;
                continue;
            }
        }
        if chars[i] == '$' && chars.get(i + 1).map(|c| c.is_alphabetic() || *c == '_').unwrap_or(false) {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            let name: String = chars[start..end].iter().collect();
            out.push_str(&std::env::var(&name).unwrap_or_default());
            i = end;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_dollar_brace_syntax() {
        std::env::set_var("CHAM_TEST_HOST", "db.example.com");
        let out = interpolate("postgres://user@${CHAM_TEST_HOST}/db");
        assert_eq!(out, "postgres://user@db.example.com/db");
    }

    #[test]
    fn interpolates_bare_dollar_syntax() {
        std::env::set_var("CHAM_TEST_USER", "alice");
        let out = interpolate("postgres://$CHAM_TEST_USER@host/db");
        assert_eq!(out, "postgres://alice@host/db");
    }

    #[test]
    fn interpolates_env_prefix_syntax() {
        std::env::set_var("CHAM_TEST_DSN", "postgres://host/db");
        let out = interpolate("env:CHAM_TEST_DSN");
        assert_eq!(out, "postgres://host/db");
    }

    #[test]
    fn unset_variable_interpolates_to_empty() {
        std::env::remove_var("CHAM_TEST_UNSET");
        let out = interpolate("postgres://${CHAM_TEST_UNSET}@host/db");
        assert_eq!(out, "postgres://@host/db");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(dir.path()).unwrap();
        assert_eq!(cfg.connection_string, "");
        assert!(cfg.schema_paths.is_empty());
    }

    #[test]
    fn database_url_env_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".chameleon.yml"),
            "database:\n  connection_string: postgres://configured/db\n",
        )
        .unwrap();
        std::env::set_var("DATABASE_URL", "postgres://overridden/db");
        let cfg = load(dir.path()).unwrap();
        assert_eq!(cfg.connection_string, "postgres://overridden/db");
        std::env::remove_var("DATABASE_URL");
    }
}
