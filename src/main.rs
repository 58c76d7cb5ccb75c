// src/main.rs

use anyhow::{anyhow, Context, Result};
use chameleon::executor::PostgresExecutor;
use chameleon::mode::{request_transition, ModeAuthConfig, TerminalPrompt};
use chameleon::orchestrator::{MigrateOptions, MigrateOutcome, Orchestrator};
use chameleon::schema_source::{PassthroughDdlGenerator, PassthroughParser};
use chameleon::vault::integrity::verify_integrity;
use chameleon::vault::Store;
use chameleon::{journal, lock, state, Error};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "chameleon")]
#[command(author, version, about = "Schema-governed migration platform for PostgreSQL", long_about = None)]
struct Cli {
    /// Working directory containing `.chameleon.yml` and the `.chameleon/` vault
    #[arg(long, global = true, default_value = ".")]
    working_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge, detect, and apply a pending schema change
    Migrate {
        /// Generate and print the DDL without registering or applying it
        #[arg(long)]
        dry_run: bool,
        /// Author recorded on the registered version (defaults to $USER)
        #[arg(long)]
        author: Option<String>,
    },
    /// Verify every registered version's snapshot and hash against the manifest
    Verify,
    /// Summarize vault, mode, and last-migration state
    Status,
    /// Inspect the append-only migration journal
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },
    /// Read or change configuration that lives in the vault
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum JournalAction {
    /// Show the most recent N journal entries (default 10)
    Last { n: Option<usize> },
    /// Show today's failed operations
    Errors,
    /// Show every recorded migration attempt
    Migrations,
    /// Print a registered schema snapshot (current version if omitted)
    Schema { version: Option<String> },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Read a configuration value (currently only `mode`)
    Get { key: String },
    /// Write a configuration value, e.g. `mode=standard`
    Set { assignment: String },
    /// Set or replace the mode-escalation password
    AuthSetPassword,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("error: {e}");
            if is_usage_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

/// Distinguish a malformed invocation (bad `config set` syntax, unknown mode
/// name) from an operational failure, per the CLI's exit-code contract: 0
/// success, 1 operational failure, 2 usage error.
fn is_usage_error(err: &anyhow::Error) -> bool {
    if let Some(Error::ModeDenied(chameleon::ModeDeniedReason::InvalidMode)) = err.downcast_ref::<Error>() {
        return true;
    }
    false
}

fn run(cli: Cli) -> Result<()> {
    let working_dir = cli.working_dir;

    match cli.command {
        None | Some(Commands::Status) => cmd_status(&working_dir),
        Some(Commands::Migrate { dry_run, author }) => cmd_migrate(&working_dir, dry_run, author),
        Some(Commands::Verify) => cmd_verify(&working_dir),
        Some(Commands::Journal { action }) => cmd_journal(&working_dir, action),
        Some(Commands::Config { action }) => cmd_config(&working_dir, action),
        Some(Commands::Completions { shell }) => {
            info!("generating shell completions for {:?}", shell);
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "chameleon", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_migrate(working_dir: &PathBuf, dry_run: bool, author: Option<String>) -> Result<()> {
    let _guard = lock::VaultLock::acquire(working_dir)?;

    let executor = PostgresExecutor;
    let orchestrator = Orchestrator::new(working_dir, &PassthroughParser, &PassthroughDdlGenerator, &executor);
    let options = MigrateOptions {
        dry_run,
        author: author.unwrap_or_default(),
    };

    match orchestrator.migrate(&options)? {
        MigrateOutcome::UpToDate => println!("No schema changes detected; nothing to do."),
        MigrateOutcome::DryRun { sql } => {
            println!("-- dry run, nothing was registered or applied --");
            print!("{sql}");
        }
        MigrateOutcome::Applied { version, duration_ms } => {
            println!("Applied {version} in {duration_ms}ms");
        }
        MigrateOutcome::RetryApplied { version, duration_ms } => {
            println!("Retried and applied pending migration {version} in {duration_ms}ms");
        }
    }
    Ok(())
}

fn cmd_verify(working_dir: &PathBuf) -> Result<()> {
    let store = Store::new(working_dir);
    let report = verify_integrity(&store)?;

    if report.valid {
        store.append_log(
            "VERIFY",
            None,
            &[("status", "ok".to_string()), ("versions", report.versions_ok.len().to_string())],
        )?;
        println!("vault is valid: {} version(s) verified", report.versions_ok.len());
        Ok(())
    } else {
        store.append_log(
            "VERIFY",
            None,
            &[("status", "failed".to_string()), ("issues", report.issues.join("; "))],
        )?;
        for issue in &report.issues {
            eprintln!("  - {issue}");
        }
        Err(anyhow!(Error::IntegrityViolation(report.issues)))
    }
}

fn cmd_status(working_dir: &PathBuf) -> Result<()> {
    let store = Store::new(working_dir);
    if !store.exists() {
        println!("vault not initialized at {}", store.root().display());
        return Ok(());
    }

    let manifest = store.load_manifest()?;
    let mode = store.load_mode_config()?.mode;
    println!("mode: {}", mode.as_str());
    println!("current version: {}", if manifest.current_version.is_empty() { "(none)" } else { &manifest.current_version });
    println!("registered versions: {}", manifest.versions.len());

    let state = state::StateTracker::new(working_dir);
    if let Some(last) = state.last()? {
        println!(
            "last migration attempt: {} ({:?}) at {}",
            last.version, last.status, last.timestamp
        );
    } else {
        println!("last migration attempt: (none)");
    }
    Ok(())
}

fn cmd_journal(working_dir: &PathBuf, action: JournalAction) -> Result<()> {
    let journal = journal::Journal::new(working_dir);
    match action {
        JournalAction::Last { n } => {
            for entry in journal.last(n.unwrap_or(10)) {
                print_entry(&entry);
            }
        }
        JournalAction::Errors => {
            for entry in journal.errors() {
                print_entry(&entry);
            }
        }
        JournalAction::Migrations => {
            for entry in journal.migrations() {
                print_entry(&entry);
            }
        }
        JournalAction::Schema { version } => {
            let store = Store::new(working_dir);
            let manifest = store.load_manifest()?;
            let target = match version {
                Some(v) => v,
                None if !manifest.current_version.is_empty() => manifest.current_version.clone(),
                None => return Err(anyhow!("no current version registered")),
            };
            let snapshot = store
                .load_snapshot(&target)
                .with_context(|| format!("no snapshot registered for {target}"))?;
            print!("{}", String::from_utf8_lossy(&snapshot));
        }
    }
    Ok(())
}

fn print_entry(entry: &journal::JournalEntry) {
    let duration = entry
        .duration_ms
        .map(|d| format!(" ({d}ms)"))
        .unwrap_or_default();
    let error = entry
        .error
        .as_deref()
        .map(|e| format!(" error={e}"))
        .unwrap_or_default();
    println!("{} [{}] {}{}{}", entry.timestamp, entry.action, entry.status, duration, error);
}

fn cmd_config(working_dir: &PathBuf, action: ConfigAction) -> Result<()> {
    let store = Store::new(working_dir);
    if !store.exists() {
        store.initialize()?;
    }

    match action {
        ConfigAction::Get { key } => match key.as_str() {
            "mode" => println!("{}", store.load_mode_config()?.mode.as_str()),
            other => return Err(anyhow!("unknown config key: {other}")),
        },
        ConfigAction::Set { assignment } => {
            let (key, value) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got '{assignment}'"))?;
            match key {
                "mode" => {
                    let _guard = lock::VaultLock::acquire(working_dir)?;
                    let journal = journal::Journal::new(working_dir);
                    let current = store.load_mode_config()?.mode;
                    let outcome = request_transition(&store, current, value, &TerminalPrompt)?;
                    match outcome {
                        chameleon::mode::ModeTransitionOutcome::Applied { mode } => {
                            let mut details = journal::Details::new();
                            details.insert("mode".into(), mode.as_str().into());
                            journal.log("config_mode", "success", details, None)?;
                            store.append_log(
                                "MODE",
                                None,
                                &[("action", "mode_updated".to_string()), ("mode", mode.as_str().to_string())],
                            )?;
                            println!("mode set to {}", mode.as_str());
                        }
                        chameleon::mode::ModeTransitionOutcome::Denied(reason) => {
                            let denial = format!("denied_{reason}");
                            journal.log_error("config_mode", &denial, journal::Details::new())?;
                            store.append_log(
                                "MODE",
                                None,
                                &[("action", "denied".to_string()), ("reason", reason.to_string())],
                            )?;
                            return Err(anyhow!(Error::ModeDenied(reason)));
                        }
                    }
                }
                other => return Err(anyhow!("unknown config key: {other}")),
            }
        }
        ConfigAction::AuthSetPassword => {
            let _guard = lock::VaultLock::acquire(working_dir)?;
            let journal = journal::Journal::new(working_dir);
            let password = chameleon::mode::resolve_password(&TerminalPrompt)?;
            let auth = ModeAuthConfig::new(&password)?;
            store.save_mode_auth(&auth)?;
            journal.log("config_mode_auth", "success", journal::Details::new(), None)?;
            store.append_log("MODE_AUTH", None, &[("action", "password_set".to_string())])?;
            println!("mode-escalation password updated");
        }
    }
    Ok(())
}
