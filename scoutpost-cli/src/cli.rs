//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Scoutpost -- per-user Nightscout instance manager.
///
/// Use `scoutpost <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "scoutpost", version, about, long_about = None)]
pub struct Cli {
    /// Path to the scoutpost.toml configuration file.
    #[arg(short, long, global = true, default_value = "scoutpost.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect and tear down instances.
    Instance(InstanceArgs),

    /// Report drift between records and containers (read-only).
    Reconcile(ReconcileArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- instance ----

#[derive(Args, Debug)]
pub struct InstanceArgs {
    #[command(subcommand)]
    pub action: InstanceAction,
}

#[derive(Subcommand, Debug)]
pub enum InstanceAction {
    /// Provision an instance for an owner (no-op if one exists).
    Create(CreateArgs),
    /// Remove the owner's container, database and record.
    Delete {
        /// Owner identity.
        owner: String,
    },
    /// Remove everything named for an owner, with or without a record.
    Purge {
        /// Owner identity.
        owner: String,
    },
    /// Show one instance.
    Show {
        /// Owner identity.
        owner: String,
    },
    /// List instances ordered by creation time.
    List {
        /// Maximum number of records (default: `[instance] list_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Provision an instance.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Owner identity (`[A-Za-z0-9_-]`).
    pub owner: String,

    #[command(flatten)]
    pub secret: SecretSource,

    /// Instance option as KEY=VALUE (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub settings: Vec<(String, String)>,
}

/// Where the instance API secret is read from. Never accepted as an argument.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SecretSource {
    /// Read the API secret from this environment variable.
    #[arg(long, value_name = "VAR")]
    pub secret_env: Option<String>,

    /// Read the API secret from the first line of stdin.
    #[arg(long)]
    pub secret_stdin: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

// ---- reconcile ----

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Maximum number of records to compare (default: `[instance] list_limit`).
    #[arg(long)]
    pub limit: Option<usize>,
}

// ---- config ----

/// Manage scoutpost configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, runtime, routing, database, store, instance).
        #[arg(long)]
        section: Option<String>,
    },
}
