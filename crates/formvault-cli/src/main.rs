// crates/formvault-cli/src/main.rs
// ============================================================================
// Module: Formvault CLI Entry Point
// Description: Command dispatcher for migrations, cleanup, and journal tasks.
// Purpose: Give operators a JSON-speaking surface over the migration facade.
// Dependencies: clap, formvault-config, formvault-core, formvault-store-sqlite
// ============================================================================

//! ## Overview
//! The `formvault` binary loads `formvault.toml`, opens the `SQLite` store,
//! resolves cipher secrets from the environment, and exposes the migration
//! facade as subcommands. Results are written to stdout as pretty JSON.
//! Failures are written to stderr and produce a failure exit code. A batch
//! or drop that completes with per-record errors prints its outcome and
//! also exits with failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use formvault_config::ActivitySinkKind;
use formvault_config::FormvaultConfig;
use formvault_core::ActivitySink;
use formvault_core::BatchRequest;
use formvault_core::FieldCipher;
use formvault_core::LogFilter;
use formvault_core::LogKind;
use formvault_core::MigrationStatus;
use formvault_core::SystemClock;
use formvault_core::runtime::FileActivitySink;
use formvault_core::runtime::IrreversibleError;
use formvault_core::runtime::MigrationContext;
use formvault_core::runtime::MigrationFacade;
use formvault_core::runtime::MigrationSummary;
use formvault_core::runtime::NoopActivitySink;
use formvault_core::runtime::StderrActivitySink;
use formvault_store_sqlite::SqliteStore;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "formvault", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `FORMVAULT_CONFIG`, then `formvault.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and run migrations.
    Migrations {
        /// Selected migrations subcommand.
        #[command(subcommand)]
        command: MigrationsCommand,
    },
    /// Irreversible plaintext removal.
    Cleanup {
        /// Selected cleanup subcommand.
        #[command(subcommand)]
        command: CleanupCommand,
    },
    /// Migration journal access.
    Logs {
        /// Selected logs subcommand.
        #[command(subcommand)]
        command: LogsCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Migration subcommands.
#[derive(Subcommand, Debug)]
enum MigrationsCommand {
    /// List the catalog with progress.
    List,
    /// Show progress for one migration.
    Status {
        /// Migration key.
        key: String,
    },
    /// Run one batch, or every batch with `--all`.
    Run(RunCommand),
}

/// Arguments for `migrations run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Migration key.
    key: String,
    /// Zero-based batch number within this operator session.
    #[arg(long, default_value_t = 0, conflicts_with = "all")]
    batch_index: u32,
    /// Repeat batches until nothing is pending.
    #[arg(long)]
    all: bool,
    /// Skip activity events for the executed batches.
    #[arg(long)]
    quiet_activity: bool,
}

/// Cleanup subcommands.
#[derive(Subcommand, Debug)]
enum CleanupCommand {
    /// Report whether the irreversible operations would pass their gates.
    Readiness,
    /// Null every plaintext value whose ciphertext exists.
    Nullify(ConfirmArgs),
    /// Drop the plaintext columns.
    DropColumns(ConfirmArgs),
}

/// Confirmation literal for irreversible operations.
#[derive(Args, Debug)]
struct ConfirmArgs {
    /// Exact confirmation literal.
    #[arg(long, value_name = "TOKEN", default_value = "")]
    confirm: String,
}

/// Journal subcommands.
#[derive(Subcommand, Debug)]
enum LogsCommand {
    /// List entries, newest first.
    List {
        /// Restrict to one migration key.
        #[arg(long, value_name = "KEY")]
        migration: Option<String>,
        /// Restrict to one entry kind.
        #[arg(long, value_enum)]
        kind: Option<LogKindArg>,
        /// Maximum entries returned.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Delete entries for one migration, or all entries.
    Clear {
        /// Restrict to one migration key.
        #[arg(long, value_name = "KEY")]
        migration: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
}

/// Journal entry kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogKindArg {
    /// Per-record failures.
    Error,
    /// Recorded changes.
    Change,
}

impl From<LogKindArg> for LogKind {
    fn from(value: LogKindArg) -> Self {
        match value {
            LogKindArg::Error => Self::Error,
            LogKindArg::Change => Self::Change,
        }
    }
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Catalog entry as listed by `migrations list`.
#[derive(Debug, Serialize)]
struct MigrationListing {
    /// Catalog metadata.
    #[serde(flatten)]
    summary: MigrationSummary,
    /// Current progress, when it could be computed.
    status: Option<MigrationStatus>,
    /// Reason the migration cannot run right now.
    blocked: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for operator-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

impl From<IrreversibleError> for CliError {
    fn from(err: IrreversibleError) -> Self {
        Self::new(format!("{}: {err}", err.code()))
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = FormvaultConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    match cli.command {
        Commands::Migrations {
            command,
        } => command_migrations(&build_facade(&config)?, command),
        Commands::Cleanup {
            command,
        } => command_cleanup(&build_facade(&config)?, &command),
        Commands::Logs {
            command,
        } => command_logs(&build_facade(&config)?, command),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(&config),
    }
}

/// Builds the facade from configuration and environment secrets.
fn build_facade(config: &FormvaultConfig) -> CliResult<MigrationFacade> {
    let registry =
        config.migrations.registry().map_err(|err| CliError::new(err.to_string()))?;
    let store = SqliteStore::open(&config.store.sqlite())
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
    let secrets =
        config.cipher.resolve_secrets().map_err(|err| CliError::new(err.to_string()))?;
    let cipher = match secrets {
        Some(secrets) => Some(Arc::new(
            FieldCipher::from_secrets(&secrets)
                .map_err(|err| CliError::new(format!("cipher setup failed: {err}")))?,
        )),
        None => None,
    };
    let activity: Arc<dyn ActivitySink> = match config.activity.sink {
        ActivitySinkKind::Stderr => Arc::new(StderrActivitySink),
        ActivitySinkKind::Noop => Arc::new(NoopActivitySink),
        ActivitySinkKind::File => {
            let path = config.activity.path.as_deref().unwrap_or_default();
            let sink = FileActivitySink::new(Path::new(path)).map_err(|err| {
                CliError::new(format!("failed to open activity log {path}: {err}"))
            })?;
            Arc::new(sink)
        }
    };
    Ok(MigrationFacade::new(registry, MigrationContext {
        records: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        state: Arc::new(store),
        cipher,
        clock: Arc::new(SystemClock),
        activity,
    }))
}

// ============================================================================
// SECTION: Migration Commands
// ============================================================================

/// Dispatches migration subcommands.
fn command_migrations(facade: &MigrationFacade, command: MigrationsCommand) -> CliResult<ExitCode> {
    match command {
        MigrationsCommand::List => {
            let listings: Vec<MigrationListing> = facade
                .list_migrations()
                .into_iter()
                .map(|summary| MigrationListing {
                    status: facade.get_status(&summary.key).ok(),
                    blocked: facade.can_run(&summary.key).err().map(|err| err.to_string()),
                    summary,
                })
                .collect();
            write_json(&listings)?;
            Ok(ExitCode::SUCCESS)
        }
        MigrationsCommand::Status {
            key,
        } => {
            let status = facade.get_status(&key).map_err(|err| CliError::new(err.to_string()))?;
            write_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }
        MigrationsCommand::Run(command) => command_migrations_run(facade, &command),
    }
}

/// Executes one batch or a full run.
fn command_migrations_run(facade: &MigrationFacade, command: &RunCommand) -> CliResult<ExitCode> {
    let success = if command.all {
        let summary = facade
            .run_until_done(&command.key, command.quiet_activity)
            .map_err(|err| CliError::new(err.to_string()))?;
        write_json(&summary)?;
        summary.success
    } else {
        let request = BatchRequest {
            batch_index: command.batch_index,
            suppress_activity: command.quiet_activity,
        };
        let outcome =
            facade.run(&command.key, &request).map_err(|err| CliError::new(err.to_string()))?;
        write_json(&outcome)?;
        outcome.success
    };
    Ok(exit_for(success))
}

// ============================================================================
// SECTION: Cleanup Commands
// ============================================================================

/// Dispatches cleanup subcommands.
fn command_cleanup(facade: &MigrationFacade, command: &CleanupCommand) -> CliResult<ExitCode> {
    match command {
        CleanupCommand::Readiness => {
            write_json(&facade.readiness()?)?;
            Ok(ExitCode::SUCCESS)
        }
        CleanupCommand::Nullify(args) => {
            let outcome = facade.bulk_nullify(&args.confirm)?;
            write_json(&outcome)?;
            Ok(exit_for(outcome.success))
        }
        CleanupCommand::DropColumns(args) => {
            let outcome = facade.drop_columns(&args.confirm)?;
            write_json(&outcome)?;
            Ok(exit_for(outcome.success))
        }
    }
}

// ============================================================================
// SECTION: Log Commands
// ============================================================================

/// Dispatches journal subcommands.
fn command_logs(facade: &MigrationFacade, command: LogsCommand) -> CliResult<ExitCode> {
    match command {
        LogsCommand::List {
            migration,
            kind,
            limit,
        } => {
            let filter = LogFilter {
                migration_key: migration,
                kind: kind.map(LogKind::from),
                limit,
            };
            let entries = facade.list_logs(&filter).map_err(|err| CliError::new(err.to_string()))?;
            write_json(&entries)?;
        }
        LogsCommand::Clear {
            migration,
        } => {
            let cleared = facade
                .clear_logs(migration.as_deref())
                .map_err(|err| CliError::new(err.to_string()))?;
            write_json(&json!({ "cleared": cleared }))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Reports a validated configuration.
fn command_config_validate(config: &FormvaultConfig) -> CliResult<ExitCode> {
    let cipher_configured = config
        .cipher
        .resolve_secrets()
        .map_err(|err| CliError::new(err.to_string()))?
        .is_some();
    write_json(&json!({
        "valid": true,
        "store_path": config.store.path.display().to_string(),
        "cipher_configured": cipher_configured,
    }))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Maps an operation's success flag to an exit code.
fn exit_for(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Writes pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&rendered)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
