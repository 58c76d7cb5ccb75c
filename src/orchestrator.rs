// src/orchestrator.rs

//! Migration Orchestrator (§4.8): the end-to-end `migrate` pipeline —
//! load → merge → parse → detect → register → apply → record — with
//! crash/retry semantics. This is the client of every other CORE
//! subsystem.

use crate::attribution;
use crate::config::{self, Config};
use crate::error::{Error, ModeDeniedReason, Result};
use crate::executor::DatabaseExecutor;
use crate::hash::hash_bytes;
use crate::journal::{Details, Journal};
use crate::merger;
use crate::mode::Mode;
use crate::schema_source::{DdlGenerator, SchemaParser};
use crate::state::{MigrationStateEntry, MigrationStatus, StateTracker};
use crate::vault::engine;
use crate::vault::integrity::verify_integrity;
use crate::vault::Store;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub dry_run: bool,
    pub author: String,
}

/// Outcome of one `migrate` invocation, for the CLI to render and turn into
/// an exit code.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrateOutcome {
    UpToDate,
    DryRun { sql: String },
    Applied { version: String, duration_ms: u64 },
    RetryApplied { version: String, duration_ms: u64 },
}

pub struct Orchestrator<'a> {
    working_dir: PathBuf,
    parser: &'a dyn SchemaParser,
    ddl_generator: &'a dyn DdlGenerator,
    executor: &'a dyn DatabaseExecutor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        working_dir: impl AsRef<Path>,
        parser: &'a dyn SchemaParser,
        ddl_generator: &'a dyn DdlGenerator,
        executor: &'a dyn DatabaseExecutor,
    ) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            parser,
            ddl_generator,
            executor,
        }
    }

    fn store(&self) -> Store {
        Store::new(&self.working_dir)
    }

    fn journal(&self) -> Journal {
        Journal::new(&self.working_dir)
    }

    fn state(&self) -> StateTracker {
        StateTracker::new(&self.working_dir)
    }

    fn state_dir(&self) -> PathBuf {
        self.working_dir.join(".chameleon").join("state")
    }

    fn merged_schema_path(&self, config: &Config) -> PathBuf {
        match &config.merged_output {
            Some(p) => PathBuf::from(p),
            None => self.state_dir().join("schema.merged.cham"),
        }
    }

    /// Run the full `migrate` pipeline (§4.8 Phases A-F).
    pub fn migrate(&self, options: &MigrateOptions) -> Result<MigrateOutcome> {
        let journal = self.journal();
        let state = self.state();
        let store = self.store();

        // Phase A — Load.
        let config = config::load(&self.working_dir)?;

        // Phase B — Vault & Mode Gate.
        if !store.exists() {
            store.initialize()?;
        }

        let report = verify_integrity(&store)?;
        if !report.valid {
            journal.log_error("integrity_violation", &report.issues.join("; "), Details::new())?;
            store.append_log(
                "VERIFY",
                None,
                &[("status", "failed".to_string()), ("issues", report.issues.join("; "))],
            )?;
            return Err(Error::IntegrityViolation(report.issues));
        }

        let mode = store.load_mode_config()?.mode;
        if mode == Mode::Readonly {
            journal.log_error("aborted_readonly", "schema locked", Details::new())?;
            return Err(Error::ModeDenied(ModeDeniedReason::ReadonlyLock));
        }

        // Phase C — Load & Merge Schemas.
        let files = load_schema_files(&config)?;
        let merged = merger::merge(&files)?;

        let parsed = match self.parser.parse(&merged.text) {
            Ok(parsed) => parsed,
            Err(failure) => {
                let attributed = if let Some(line) = failure.line {
                    attribution::attribute(&format!("line {line}"), &merged.source_map)
                } else {
                    String::new()
                };
                let debug_path = self.persist_debug_snapshot(&merged.text)?;

                let mut details = Details::new();
                details.insert("debug_path".into(), debug_path.display().to_string().into());
                if !attributed.is_empty() {
                    details.insert("attribution".into(), attributed.clone().into());
                }
                journal.log_error("parse_error", &failure.to_string(), details)?;

                return Err(Error::Parse {
                    location: if attributed.is_empty() {
                        failure.to_string()
                    } else {
                        attributed
                    },
                    message: failure.message.clone(),
                    snippet: failure.snippet.clone(),
                    suggestion: failure.suggestion.clone(),
                });
            }
        };

        // Phase D — Change Detection.
        let merged_schema_path = self.merged_schema_path(&config);
        if let Some(parent) = merged_schema_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&merged_schema_path, &merged.text)?;

        let (changed, mut summary) = engine::detect_changes(&store, &merged_schema_path)?;
        let manifest = store.load_manifest()?;
        // lastApplied (§4.8 step 10) means the last *successfully applied*
        // migration for the current vault version, not merely the last
        // attempt — a version whose only state entry is Failed/PendingMigration
        // still needs a retry even though its version matches current_version.
        let pending_unapplied = if manifest.current_version.is_empty() {
            false
        } else {
            match state.last_for_version(&manifest.current_version)? {
                Some(entry) => entry.status != MigrationStatus::Applied,
                None => true,
            }
        };

        if !changed && !pending_unapplied {
            journal.log("no_changes", "ok", Details::new(), None)?;
            return Ok(MigrateOutcome::UpToDate);
        }
        if !changed && pending_unapplied {
            summary = format!("Retry pending migration for {}", manifest.current_version);
        }

        // Phase E — DDL Generation & Preview.
        let migration_sql = self.ddl_generator.generate(&parsed);

        if options.dry_run {
            journal.log("dry_run", "ok", Details::new(), None)?;
            return Ok(MigrateOutcome::DryRun { sql: migration_sql });
        }

        // Phase F — Register-then-Apply.
        let author = if options.author.is_empty() {
            std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
        } else {
            options.author.clone()
        };
        let new_version = engine::register_version(&store, &merged_schema_path, &author, &summary)?;
        let ddl_hash = hash_bytes(migration_sql.as_bytes());

        let start = Instant::now();
        if let Err(connect_err) = self.executor.connect(&config.connection_string) {
            self.record_failure(&state, &store, &journal, &new_version.version, &new_version.hash, &ddl_hash, &connect_err.to_string())?;
            return Err(connect_err);
        }

        let exec_result = self.executor.execute(&config.connection_string, &migration_sql);
        let duration_ms = start.elapsed().as_millis() as u64;

        match exec_result {
            Err(exec_err) => {
                self.record_failure(&state, &store, &journal, &new_version.version, &new_version.hash, &ddl_hash, &exec_err.to_string())?;
                Err(exec_err)
            }
            Ok(()) => {
                state.record(MigrationStateEntry {
                    version: new_version.version.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    kind: "migration".to_string(),
                    description: summary.clone(),
                    status: MigrationStatus::Applied,
                    schema_hash: new_version.hash.clone(),
                    ddl_hash: ddl_hash.clone(),
                    checksum: "verified".to_string(),
                    applied_at: Some(chrono::Utc::now().to_rfc3339()),
                })?;

                journal.log_migration(
                    &new_version.version,
                    "applied",
                    Some(duration_ms),
                    None,
                    Details::new(),
                )?;
                store.append_log(
                    "MIGRATE",
                    Some(&new_version.version),
                    &[("status", "applied".to_string()), ("duration", duration_ms.to_string())],
                )?;

                info!(version = %new_version.version, duration_ms, "migration applied");
                if pending_unapplied {
                    Ok(MigrateOutcome::RetryApplied { version: new_version.version, duration_ms })
                } else {
                    Ok(MigrateOutcome::Applied { version: new_version.version, duration_ms })
                }
            }
        }
    }

    fn record_failure(
        &self,
        state: &StateTracker,
        store: &Store,
        journal: &Journal,
        version: &str,
        schema_hash: &str,
        ddl_hash: &str,
        error_message: &str,
    ) -> Result<()> {
        // Recorded as PendingMigration, not Failed: the vault version is
        // already registered (§4.7), so the next `migrate` run must retry it
        // rather than treat it as a dead end (§4.8 steps 17-18, scenario 5).
        state.record(MigrationStateEntry {
            version: version.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind: "migration".to_string(),
            description: "failed attempt, pending retry".to_string(),
            status: MigrationStatus::PendingMigration,
            schema_hash: schema_hash.to_string(),
            ddl_hash: ddl_hash.to_string(),
            checksum: "unverified".to_string(),
            applied_at: None,
        })?;

        journal.log_migration(version, "failed", None, Some(error_message), Details::new())?;
        store.append_log(
            "MIGRATE",
            Some(version),
            &[("status", "failed".to_string()), ("error", error_message.to_string())],
        )?;
        warn!(version, error = error_message, "migration attempt failed");
        Ok(())
    }

    fn persist_debug_snapshot(&self, merged_text: &str) -> Result<PathBuf> {
        let debug_dir = self.state_dir().join("debug");
        std::fs::create_dir_all(&debug_dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let path = debug_dir.join(format!("schema.merged.{stamp}.cham"));
        std::fs::write(&path, merged_text)?;
        Ok(path)
    }
}

/// Load every file under the configured schema paths, in stable
/// lexicographic order by full path (§4.8 Phase C step 6). Each configured
/// path may be a single file or a directory walked recursively.
fn load_schema_files(config: &Config) -> Result<Vec<(String, String)>> {
    if config.schema_paths.is_empty() {
        return Err(Error::SchemaLoad("no schema.paths configured".into()));
    }

    let mut discovered: Vec<PathBuf> = Vec::new();
    for configured in &config.schema_paths {
        let path = Path::new(configured);
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    discovered.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            discovered.push(path.to_path_buf());
        } else {
            return Err(Error::SchemaLoad(format!("schema path not found: {configured}")));
        }
    }

    discovered.sort();

    let mut files = Vec::with_capacity(discovered.len());
    for path in discovered {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::SchemaLoad(format!("failed to read {}: {e}", path.display())))?;
        files.push((path.display().to_string(), content));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_source::{ParsedSchema, PassthroughDdlGenerator, PassthroughParser};
    use std::sync::Mutex;

    struct AlwaysOkExecutor;
    impl DatabaseExecutor for AlwaysOkExecutor {
        fn connect(&self, _connection_string: &str) -> Result<()> {
            Ok(())
        }
        fn execute(&self, _connection_string: &str, _ddl: &str) -> Result<()> {
            Ok(())
        }
    }

    struct ConnectFailsExecutor;
    impl DatabaseExecutor for ConnectFailsExecutor {
        fn connect(&self, _connection_string: &str) -> Result<()> {
            Err(Error::DatabaseConnect("simulated connect failure".into()))
        }
        fn execute(&self, _connection_string: &str, _ddl: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Fails execute() the first N times it's called, then succeeds —
    /// models scenario 5's "fix the DB-side issue, retry" flow.
    struct FlakyExecutor {
        remaining_failures: Mutex<u32>,
    }
    impl DatabaseExecutor for FlakyExecutor {
        fn connect(&self, _connection_string: &str) -> Result<()> {
            Ok(())
        }
        fn execute(&self, _connection_string: &str, _ddl: &str) -> Result<()> {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                Err(Error::DatabaseExec("simulated exec failure".into()))
            } else {
                Ok(())
            }
        }
    }

    fn write_schema_dir(root: &Path, content: &str) {
        let schema_dir = root.join("schema");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::write(schema_dir.join("users.cham"), content).unwrap();
        std::fs::write(
            root.join(".chameleon.yml"),
            format!(
                "database:\n  connection_string: postgres://user@localhost/db\nschema:\n  paths:\n    - {}\n",
                schema_dir.display()
            ),
        )
        .unwrap();
    }

    #[test]
    fn fresh_init_and_first_migrate_registers_v001() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary, email: string unique }");

        // Standard mode so the write isn't blocked by the readonly default.
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &AlwaysOkExecutor);
        let outcome = orchestrator.migrate(&MigrateOptions::default()).unwrap();

        match outcome {
            MigrateOutcome::Applied { version, .. } => assert_eq!(version, "v001"),
            other => panic!("expected Applied, got {other:?}"),
        }

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.current_version, "v001");
        assert_eq!(manifest.versions[0].parent, None);
    }

    #[test]
    fn unchanged_rerun_reports_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &AlwaysOkExecutor);
        orchestrator.migrate(&MigrateOptions::default()).unwrap();
        let second = orchestrator.migrate(&MigrateOptions::default()).unwrap();
        assert_eq!(second, MigrateOutcome::UpToDate);

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1);
    }

    #[test]
    fn readonly_mode_blocks_migration() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap(); // defaults to readonly

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &AlwaysOkExecutor);
        let err = orchestrator.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::ModeDenied(ModeDeniedReason::ReadonlyLock)
        ));

        let manifest = store.load_manifest().unwrap();
        assert!(manifest.versions.is_empty());
    }

    #[test]
    fn integrity_violation_aborts_before_registration() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &AlwaysOkExecutor);
        orchestrator.migrate(&MigrateOptions::default()).unwrap();

        // Tamper with the registered snapshot.
        let snapshot_path = store.root().join("versions").join("v001.json");
        let mut bytes = std::fs::read(&snapshot_path).unwrap();
        bytes.push(b'\n');
        std::fs::write(&snapshot_path, bytes).unwrap();

        let err = orchestrator.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(err, Error::IntegrityViolation(_)));

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1, "no new version should be registered");
    }

    #[test]
    fn failed_db_apply_then_retry_succeeds_without_new_version() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let flaky = FlakyExecutor { remaining_failures: Mutex::new(1) };
        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &flaky);

        let first = orchestrator.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(first, Error::DatabaseExec(_)));

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1);
        assert_eq!(manifest.current_version, "v001");

        let state = StateTracker::new(dir.path());
        assert_eq!(state.last().unwrap().unwrap().status, MigrationStatus::PendingMigration);

        // Retry: schema is unchanged but the last attempt failed, so this
        // should re-enter Phase F without registering a new version.
        let second = orchestrator.migrate(&MigrateOptions::default()).unwrap();
        match second {
            MigrateOutcome::RetryApplied { version, .. } => assert_eq!(version, "v001"),
            other => panic!("expected RetryApplied, got {other:?}"),
        }

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1, "retry must not register a second version");
        assert_eq!(state.last().unwrap().unwrap().status, MigrationStatus::Applied);
    }

    #[test]
    fn connect_failure_is_recorded_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &ConnectFailsExecutor);
        let err = orchestrator.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DatabaseConnect(_)));

        let state = StateTracker::new(dir.path());
        assert_eq!(state.last().unwrap().unwrap().status, MigrationStatus::PendingMigration);
        // The vault version is still registered per §4.8 step 17.
        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.versions.len(), 1);
    }

    #[test]
    fn dry_run_does_not_register_or_touch_state() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path(), "entity User { id: uuid primary }");
        let store = Store::new(dir.path());
        store.initialize().unwrap();
        store
            .save_mode_config(&crate::mode::ModeConfig { mode: Mode::Standard })
            .unwrap();

        let orchestrator = Orchestrator::new(dir.path(), &PassthroughParser, &PassthroughDdlGenerator, &AlwaysOkExecutor);
        let outcome = orchestrator
            .migrate(&MigrateOptions { dry_run: true, author: String::new() })
            .unwrap();
        assert!(matches!(outcome, MigrateOutcome::DryRun { .. }));

        let manifest = store.load_manifest().unwrap();
        assert!(manifest.versions.is_empty());
    }

    #[test]
    fn unused_parsed_schema_type_is_constructible() {
        // Exercises the opaque AST type directly; the orchestrator only
        // ever receives one from `SchemaParser::parse`.
        let schema = ParsedSchema { source: "entity X {}".into() };
        assert_eq!(PassthroughDdlGenerator.generate(&schema).is_empty(), false);
    }
}
