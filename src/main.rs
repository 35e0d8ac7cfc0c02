mod assistant;
mod config;
mod error;
mod hook;
mod layout;
mod logging;
mod picker;
mod prd;
mod prompts;
mod settings;
mod store;
mod transcript;
mod types;

use anyhow::{Context, Result};
use assistant::ProcessLauncher;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use config::Config;
use hook::{HookContext, HookEnv};
use layout::SpecLayout;
use picker::TerminalPicker;
use prd::Orchestrator;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use store::ParentInvocationStore;
use tracing::info;

/// Write PRDs with the Claude Code assistant and resume or redo past sessions.
#[derive(Parser, Debug)]
#[command(name = "hail-mary")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter (e.g. `debug`, `hail_mary=trace`); overrides HAIL_MARY_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Product requirements documents
    Prd {
        #[command(subcommand)]
        command: PrdCommand,
    },
    /// Handle one hook event from the assistant (reads JSON on stdin)
    #[command(hide = true)]
    Hook,
    /// Read or change ~/.hail-mary/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Inspect or prune recorded assistant runs
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PrdCommand {
    /// Start a new PRD for a feature
    Init,
    /// Pick a feature and session to continue or redo
    Resume,
    /// Continue the most recent assistant conversation
    Continue {
        /// Permission mode for this run (acceptEdits, bypassPermissions, default, plan)
        #[arg(long, short = 'm')]
        permission_mode: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print every key and value
    List,
    /// Print one value
    Get { key: String },
    /// Set a value (lists are comma separated)
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List recorded parent invocations
    List,
    /// Remove records older than N days
    Clean {
        #[arg(long)]
        days: Option<u64>,
    },
    /// Copy a transcript backup back over the transcript
    Restore {
        transcript: PathBuf,
        #[arg(long)]
        backup: PathBuf,
    },
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading hook input from stdin")?;
    Ok(buffer)
}

// ---------------------------------------------------------------
// hook
// ---------------------------------------------------------------

fn run_hook() -> Result<()> {
    let input = read_stdin()?;
    let event = match types::decode(&input) {
        Ok(event) => event,
        Err(error::Error::UnknownEvent(kind)) => {
            info!(kind = %kind, "ignoring unknown hook event");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let ctx = HookContext::new(ParentInvocationStore::open_default()?, HookEnv::from_env());
    if let Some(output) = ctx.handle(&event, Utc::now())? {
        println!(
            "{}",
            serde_json::to_string(&output).context("serializing hook output")?
        );
    }
    Ok(())
}

// ---------------------------------------------------------------
// prd
// ---------------------------------------------------------------

fn run_prd(command: PrdCommand) -> Result<()> {
    let mut config = Config::load()?;
    if let PrdCommand::Continue {
        permission_mode: Some(mode),
    } = &command
    {
        config = config.with_value("permission_mode", mode)?;
    }
    let cwd = std::env::current_dir().context("reading current directory")?;
    let orchestrator = Orchestrator {
        layout: SpecLayout::discover(&cwd),
        config,
        picker: &TerminalPicker,
        launcher: &ProcessLauncher,
        exe: std::env::current_exe().context("locating the hail-mary executable")?,
        tmp_dir: std::env::temp_dir(),
        parent_token: process::id().to_string(),
    };

    match command {
        PrdCommand::Init => orchestrator.new_prd(),
        PrdCommand::Resume => orchestrator.resume_prd(),
        PrdCommand::Continue { .. } => orchestrator.continue_latest(),
    }
}

// ---------------------------------------------------------------
// config
// ---------------------------------------------------------------

fn run_config(command: ConfigCommand) -> Result<()> {
    let path = config::default_path()?;
    let config = Config::load_from(&path)?;
    match command {
        ConfigCommand::List => {
            for (key, value) in config.list()? {
                println!("{key} = {value}");
            }
        }
        ConfigCommand::Get { key } => println!("{}", config.get(&key)?),
        ConfigCommand::Set { key, value } => {
            let updated = config.with_value(&key, &value)?;
            updated.save_to(&path)?;
            println!("{key} = {}", updated.get(&key)?);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------
// sessions
// ---------------------------------------------------------------

fn run_sessions(command: SessionsCommand) -> Result<()> {
    let store = ParentInvocationStore::open_default()?;
    match command {
        SessionsCommand::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No recorded sessions in {}", store.dir().display());
            }
            for (token, record) in records {
                let turns = transcript::count_user_turns(&record.transcript_path)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| "-".into());
                println!(
                    "{token}\t{}\t{}\t{turns} turn(s)",
                    record.short_id(),
                    record.last_updated.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        SessionsCommand::Clean { days } => {
            let days = match days {
                Some(days) => days,
                None => Config::load()?.stale_session_days,
            };
            let removed = store.cleanup_older_than(Duration::from_secs(days.saturating_mul(24 * 60 * 60)))?;
            println!("Removed {removed} session record(s) older than {days} day(s)");
        }
        SessionsCommand::Restore { transcript, backup } => {
            transcript::restore(&transcript, &backup)?;
            println!("Restored {} from {}", transcript.display(), backup.display());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let result = match cli.command {
        Command::Prd { command } => run_prd(command),
        Command::Hook => run_hook(),
        Command::Config { command } => run_config(command),
        Command::Sessions { command } => run_sessions(command),
    };

    if let Err(err) = result {
        eprintln!("hail-mary: {err:#}");
        process::exit(1);
    }
}
