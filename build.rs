// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("chameleon")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ChameleonDB Contributors")
        .about("Schema-governed migration platform for PostgreSQL")
        .subcommand_required(false)
        .arg(
            Arg::new("working_dir")
                .long("working-dir")
                .value_name("DIR")
                .default_value(".")
                .global(true)
                .help("Working directory containing .chameleon.yml and the .chameleon/ vault"),
        )
        .subcommand(
            Command::new("migrate")
                .about("Merge, detect, and apply a pending schema change")
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(clap::ArgAction::SetTrue)
                        .help("Generate and print the DDL without registering or applying it"),
                )
                .arg(
                    Arg::new("author")
                        .long("author")
                        .value_name("NAME")
                        .help("Author recorded on the registered version (defaults to $USER)"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify every registered version's snapshot and hash against the manifest"),
        )
        .subcommand(Command::new("status").about("Summarize vault, mode, and last-migration state"))
        .subcommand(
            Command::new("journal")
                .about("Inspect the append-only migration journal")
                .subcommand(
                    Command::new("last")
                        .about("Show the most recent N journal entries (default 10)")
                        .arg(Arg::new("n").help("Number of entries")),
                )
                .subcommand(Command::new("errors").about("Show today's failed operations"))
                .subcommand(Command::new("migrations").about("Show every recorded migration attempt"))
                .subcommand(
                    Command::new("schema")
                        .about("Print a registered schema snapshot (current version if omitted)")
                        .arg(Arg::new("version").help("A vNNN version identifier")),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Read or change configuration that lives in the vault")
                .subcommand(
                    Command::new("get")
                        .about("Read a configuration value")
                        .arg(Arg::new("key").required(true)),
                )
                .subcommand(
                    Command::new("set")
                        .about("Write a configuration value, e.g. mode=standard")
                        .arg(Arg::new("assignment").required(true)),
                )
                .subcommand(
                    Command::new("auth-set-password")
                        .about("Set or replace the mode-escalation password"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("chameleon.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
