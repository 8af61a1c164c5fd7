//! `timekeep` administrative CLI.
//!
//! Runs engine operations against the configured database and prints the
//! result as JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::info;

use timekeep_core::config::{database_path, load_config};
use timekeep_core::db::unix_timestamp;
use timekeep_core::tracing_init::{default_filter, init_tracing};
use timekeep_engine::migration::MoveRequest;
use timekeep_engine::storage::{Database, LeaveType, Overlay, TerminalStatus};
use timekeep_engine::{Engine, TracingObserver};

#[derive(Debug, Parser)]
#[command(name = "timekeep", version, about = "Attendance engine for biometric terminals")]
struct Cli {
    /// Config file merged over the global settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest an ATTLOG push body from a terminal
    Ingest {
        /// Terminal serial number
        #[arg(long)]
        serial: String,
        /// Terminal network address
        #[arg(long)]
        ip: Option<String>,
        /// File with push lines, or "-" for stdin
        file: PathBuf,
    },
    /// Move an employee's enrollment to another terminal
    Move {
        #[arg(long)]
        employee: String,
        /// Source terminal serial
        #[arg(long)]
        from: String,
        /// Target terminal serial
        #[arg(long)]
        to: String,
        /// Do not copy biometric templates
        #[arg(long)]
        no_templates: bool,
        /// Administrator performing the move
        #[arg(long)]
        by: String,
    },
    /// Leave requests
    #[command(subcommand)]
    Leave(LeaveCommand),
    /// Set or clear a day overlay
    Overlay {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        date: NaiveDate,
        /// "leave", "holiday" or "none"
        #[arg(long, value_parser = ["leave", "holiday", "none"])]
        kind: String,
    },
    /// Approve one employee-day
    ApproveDay {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        by: String,
    },
    /// Recompute one employee-day from its stored punches
    Rebuild {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Attendance totals over a date range
    Report {
        #[command(flatten)]
        range: DateRange,
        #[arg(long)]
        employee: Option<String>,
    },
    /// Export punches in attendance log format
    Export {
        #[command(flatten)]
        range: DateRange,
        #[arg(long)]
        terminal: Option<String>,
    },
    /// Terminal management
    #[command(subcommand)]
    Terminals(TerminalCommand),
}

#[derive(Debug, Args)]
struct DateRange {
    /// First date (inclusive)
    #[arg(long)]
    from: NaiveDate,
    /// Last date (inclusive)
    #[arg(long)]
    to: NaiveDate,
}

#[derive(Debug, Subcommand)]
enum LeaveCommand {
    /// File a pending leave request
    Request {
        #[arg(long)]
        employee: String,
        #[arg(long = "type", default_value = "annual")]
        leave_type: LeaveType,
        #[command(flatten)]
        range: DateRange,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Approve a pending request
    Approve {
        id: i64,
        #[arg(long)]
        by: String,
    },
    /// Reject a pending request
    Reject {
        id: i64,
        #[arg(long)]
        by: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Withdraw a pending request
    Cancel { id: i64 },
}

#[derive(Debug, Subcommand)]
enum TerminalCommand {
    /// List terminals
    List {
        #[arg(long)]
        status: Option<TerminalStatus>,
    },
    /// Record a heartbeat, registering the terminal if unknown
    Ping {
        serial: String,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Set a terminal's operational status
    Status {
        serial: String,
        status: TerminalStatus,
    },
    /// Take silent terminals offline
    Sweep,
    /// Show a terminal's audit log
    Logs {
        serial: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[allow(clippy::print_stdout)]
fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_body(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut body = String::new();
        tokio::io::stdin().read_to_string(&mut body).await?;
        return Ok(body);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if cli.db.is_some() {
        config.database.path = cli.db;
    }

    init_tracing(
        &default_filter(env!("CARGO_PKG_NAME"), &config.logging.level),
        config.logging.json,
    );

    let path = config
        .database
        .path
        .clone()
        .or_else(database_path)
        .context("No database path configured and no data directory available")?;
    info!(path = %path.display(), "Opening database");
    let db = Database::open_with(&path, config.database.pool).await?;
    let engine = Engine::new(db, &config, Arc::new(TracingObserver));

    run(&engine, cli.command).await
}

#[allow(clippy::too_many_lines)]
async fn run(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { serial, ip, file } => {
            let body = read_body(&file).await?;
            let report = engine
                .ingestor()
                .ingest_batch(&serial, ip.as_deref(), &body)
                .await?;
            emit(&report)
        }
        Commands::Move {
            employee,
            from,
            to,
            no_templates,
            by,
        } => {
            let result = engine
                .migration()
                .move_employee(&MoveRequest {
                    employee_code: employee,
                    source_serial: from,
                    target_serial: to,
                    copy_templates: !no_templates,
                    moved_by: by,
                })
                .await?;
            emit(&result)
        }
        Commands::Leave(cmd) => {
            let leave = engine.leave();
            let request = match cmd {
                LeaveCommand::Request {
                    employee,
                    leave_type,
                    range,
                    reason,
                } => {
                    leave
                        .request(&employee, leave_type, range.from, range.to, &reason)
                        .await?
                }
                LeaveCommand::Approve { id, by } => leave.approve(id, &by).await?,
                LeaveCommand::Reject { id, by, notes } => leave.reject(id, &by, &notes).await?,
                LeaveCommand::Cancel { id } => leave.cancel(id).await?,
            };
            emit(&request)
        }
        Commands::Overlay {
            employee,
            date,
            kind,
        } => {
            let overlay = match kind.as_str() {
                "leave" => Some(Overlay::Leave),
                "holiday" => Some(Overlay::Holiday),
                _ => None,
            };
            let summary = engine
                .aggregator()
                .apply_overlay(&employee, date, overlay)
                .await?;
            emit(&summary)
        }
        Commands::ApproveDay { employee, date, by } => {
            let summary = engine.aggregator().approve_day(&employee, date, &by).await?;
            emit(&summary)
        }
        Commands::Rebuild { employee, date } => {
            let summary = engine.aggregator().rebuild_day(&employee, date).await?;
            emit(&summary)
        }
        Commands::Report { range, employee } => {
            let report = engine
                .report(employee.as_deref(), range.from, range.to)
                .await?;
            emit(&report)
        }
        Commands::Export { range, terminal } => {
            let log = engine
                .export(range.from, range.to, terminal.as_deref())
                .await?;
            #[allow(clippy::print_stdout)]
            {
                print!("{log}");
            }
            Ok(())
        }
        Commands::Terminals(cmd) => {
            let registry = engine.registry();
            match cmd {
                TerminalCommand::List { status } => emit(&registry.list_terminals(status).await?),
                TerminalCommand::Ping { serial, ip } => {
                    emit(&registry.ping(&serial, ip.as_deref()).await?)
                }
                TerminalCommand::Status { serial, status } => {
                    emit(&registry.set_status(&serial, status).await?)
                }
                TerminalCommand::Sweep => {
                    let changed = registry.mark_stale_offline(unix_timestamp()).await?;
                    emit(&serde_json::json!({ "marked_offline": changed }))
                }
                TerminalCommand::Logs { serial, limit } => {
                    emit(&registry.terminal_logs(&serial, limit).await?)
                }
            }
        }
    }
}
