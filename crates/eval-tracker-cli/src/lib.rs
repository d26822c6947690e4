//! Operator command surface for the evaluation request tracker.
//!
//! [`run_cli`] executes a parsed [`Cli`]; every command prints pretty JSON on
//! stdout and returns an error for the binary to report on stderr.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eval_tracker_api::{RequestService, SessionManager};
use eval_tracker_core::{now_utc, RequestStatus, TrackerError, DEFAULT_SESSION_LIFETIME_HOURS};
use eval_tracker_store_json::JsonRequestStore;
use serde::Serialize;
use serde_json::{json, Value};
use time::Duration;

#[derive(Debug, Parser)]
#[command(name = "evt")]
#[command(about = "Evaluation request tracker operations CLI")]
pub struct Cli {
    #[arg(long, env = "EVAL_TRACKER_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Defaults to `<data-dir>/sessions`.
    #[arg(long, env = "EVAL_TRACKER_SESSIONS_DIR")]
    sessions_dir: Option<PathBuf>,

    /// Skip pre-write backups for mutating commands.
    #[arg(long)]
    no_backups: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Requests {
        #[command(subcommand)]
        command: Box<RequestsCommand>,
    },
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
    Backups {
        #[command(subcommand)]
        command: BackupsCommand,
    },
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum RequestsCommand {
    List(ListArgs),
    Show(IdArgs),
    Search(SearchArgs),
    Delete(IdArgs),
    Export(ExportArgs),
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    status: Option<StatusArg>,
    /// Keep index order instead of sorting by priority.
    #[arg(long)]
    unsorted: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    query: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Write to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// JSON file holding an array of request documents.
    #[arg(long)]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    Check,
    Rebuild,
}

#[derive(Debug, Subcommand)]
pub enum BackupsCommand {
    Prune(PruneArgs),
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    #[arg(long, default_value_t = 30)]
    retention_days: u32,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    Sweep,
    Count,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    InProgress,
    Completed,
}

impl From<StatusArg> for RequestStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Completed => Self::Completed,
        }
    }
}

/// Executes a parsed command line.
///
/// # Errors
/// Returns an error when the store cannot be opened, a record is missing or
/// an operation fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let backup_enabled = !cli.no_backups;
    tracing::debug!(data_dir = %cli.data_dir.display(), backup_enabled, "running command");
    match cli.command {
        Command::Requests { command } => {
            let service = RequestService::open(&cli.data_dir, backup_enabled)?;
            run_requests(*command, &service)
        }
        Command::Index { command } => {
            // Inspect the index as found on disk.
            let store = JsonRequestStore::open_unreconciled(&cli.data_dir, backup_enabled)?;
            match command {
                IndexCommand::Check => print_json(&store.check_index()?),
                IndexCommand::Rebuild => {
                    let index = store.rebuild_index()?;
                    tracing::info!(count = index.count, "index rebuilt from disk");
                    print_json(&index)
                }
            }
        }
        Command::Backups {
            command: BackupsCommand::Prune(args),
        } => {
            let service = RequestService::open(&cli.data_dir, backup_enabled)?;
            let report = service.store().prune_backups(args.retention_days, now_utc())?;
            tracing::info!(
                retention_days = args.retention_days,
                removed = report.removed.len(),
                "pruned backups"
            );
            print_json(&report)
        }
        Command::Sessions { command } => {
            let sessions_dir = cli
                .sessions_dir
                .unwrap_or_else(|| cli.data_dir.join("sessions"));
            let manager = SessionManager::open(
                &sessions_dir,
                Duration::hours(DEFAULT_SESSION_LIFETIME_HOURS),
            )?;
            match command {
                SessionsCommand::Sweep => print_json(&manager.sweep_expired()?),
                SessionsCommand::Count => {
                    print_json(&json!({"active_sessions": manager.count_active()?}))
                }
            }
        }
    }
}

fn run_requests(command: RequestsCommand, service: &RequestService) -> Result<()> {
    match command {
        RequestsCommand::List(args) => {
            print_json(&service.list(args.status.map(RequestStatus::from), !args.unsorted)?)
        }
        RequestsCommand::Show(args) => print_json(&service.get(&args.id)?),
        RequestsCommand::Search(args) => print_json(&service.search(&args.query)?),
        RequestsCommand::Delete(args) => {
            if !service.delete(&args.id)? {
                tracing::warn!(request_id = %args.id, "delete of unknown request");
                return Err(TrackerError::NotFound(args.id).into());
            }
            print_json(&json!({"id": args.id, "deleted": true}))
        }
        RequestsCommand::Export(args) => {
            let requests = service.export()?;
            match args.output {
                Some(path) => {
                    write_pretty(&path, &requests)?;
                    tracing::info!(count = requests.len(), output = %path.display(), "exported requests");
                    print_json(&json!({
                        "exported": requests.len(),
                        "output": path.display().to_string(),
                    }))
                }
                None => print_json(&requests),
            }
        }
        RequestsCommand::Import(args) => {
            let documents = read_documents(&args.input)?;
            tracing::debug!(input = %args.input.display(), documents = documents.len(), "importing requests");
            print_json(&service.import(documents)?)
        }
    }
}

fn read_documents(path: &Path) -> Result<Vec<Value>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read import file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse import file {}", path.display()))?;
    match parsed {
        Value::Array(documents) => Ok(documents),
        _ => Err(anyhow!(
            "import file {} must contain a JSON array of requests",
            path.display()
        )),
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
