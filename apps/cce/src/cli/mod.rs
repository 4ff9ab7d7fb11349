//! # CLI
//!
//! Command-line surface of the engine.
//!
//! Argument types live here; the `cmd_*` functions in [`commands`] do the
//! work and are what the integration tests call.

mod commands;

pub use commands::{
    build_coordinator, cmd_events, cmd_ingest, cmd_init, cmd_policy_deactivate,
    cmd_policy_import, cmd_policy_list, cmd_run, cmd_serve, cmd_watch, open_store, render_events,
    render_policies, render_run, WatchSummary,
};

use crate::config::{
    EngineConfig, RunOptions, DEFAULT_CHECK_TIMEOUT_MS, DEFAULT_CONCURRENCY, DEFAULT_DB_PATH,
};
use crate::error::{exit_codes, EngineError};
use cce_core::{RunType, StageNumber, DEFAULT_PASS_THRESHOLD, DEFAULT_STAGE_COUNT};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

/// cce: continuous compliance checks across a staged pipeline.
///
/// Evaluates stored policies against every pipeline stage, scores the
/// violations, and records an audit trail of each run.
#[derive(Debug, Parser)]
#[command(name = "cce", version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Store file.
    #[arg(long, global = true, env = "CCE_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Minimum critical score for a run to pass.
    #[arg(long, global = true, env = "CCE_PASS_THRESHOLD", default_value_t = DEFAULT_PASS_THRESHOLD)]
    pub pass_threshold: u32,

    /// Checks evaluated at once.
    #[arg(long, global = true, env = "CCE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-check timeout in milliseconds.
    #[arg(long, global = true, env = "CCE_CHECK_TIMEOUT_MS", default_value_t = DEFAULT_CHECK_TIMEOUT_MS)]
    pub check_timeout_ms: u64,

    /// Stages in the governed pipeline.
    #[arg(long, global = true, env = "CCE_STAGE_COUNT", default_value_t = DEFAULT_STAGE_COUNT)]
    pub stage_count: StageNumber,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the store file.
    Init {
        /// Replace an existing store.
        #[arg(long)]
        force: bool,

        /// Seed the built-in default policies.
        #[arg(long)]
        seed_defaults: bool,
    },

    /// Run one compliance check.
    Run(RunArgs),

    /// Run scheduled checks on an interval until interrupted.
    Watch(WatchArgs),

    /// Policy catalog management.
    #[command(subcommand)]
    Policy(PolicyCommand),

    /// Load governed rows from a JSON array of objects.
    Ingest {
        /// Target table.
        table: String,
        /// JSON file.
        file: PathBuf,
    },

    /// Show the audit trail of one run.
    Events {
        /// Run id.
        check_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP trigger surface.
    Serve {
        #[arg(long, env = "CCE_ADDR", default_value = "127.0.0.1:8787")]
        addr: String,

        /// Bearer token required on run requests.
        #[arg(long, env = "CCE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Comma-separated stage numbers (default: every stage).
    #[arg(long)]
    pub stages: Option<String>,

    /// manual, scheduled, or on_demand.
    #[arg(long, default_value = "manual")]
    pub run_type: String,

    /// Write the audit trail.
    #[arg(long)]
    pub emit_events: bool,

    /// Use the built-in policies instead of the store.
    #[arg(long)]
    pub no_registry: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[arg(long)]
    pub stages: Option<String>,

    #[arg(long, default_value_t = 300)]
    pub interval_secs: u64,

    /// Stop after this many runs.
    #[arg(long)]
    pub max_runs: Option<u64>,

    #[arg(long)]
    pub emit_events: bool,

    #[arg(long)]
    pub no_registry: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Store policies from a JSON file (one object or an array).
    Import { file: PathBuf },

    /// List stored policies.
    List {
        /// Include inactive versions.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },

    /// Deactivate a policy.
    Deactivate { policy_id: String },
}

impl Cli {
    pub fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        let config = EngineConfig::new(
            self.db.clone(),
            self.pass_threshold,
            self.concurrency,
            self.check_timeout_ms,
        )?;
        Ok(config.with_stage_count(self.stage_count)?)
    }
}

/// Execute a parsed command line and return the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<i32, EngineError> {
    let config = cli.engine_config()?;

    match cli.command {
        Command::Init {
            force,
            seed_defaults,
        } => {
            let seeded = cmd_init(&config.db_path, force, seed_defaults)?;
            println!(
                "Initialized {} ({seeded} default policies)",
                config.db_path.display()
            );
            Ok(exit_codes::PASS)
        }
        Command::Run(args) => {
            let options = RunOptions::from_args(
                args.stages.as_deref(),
                &args.run_type,
                args.emit_events,
                args.no_registry,
                config.stage_count,
            )?;
            let outcome = tokio::select! {
                outcome = cmd_run(&config, &options, args.json) => outcome?,
                _ = tokio::signal::ctrl_c() => return Err(EngineError::Cancelled),
            };
            Ok(if outcome.passing() {
                exit_codes::PASS
            } else {
                exit_codes::FAILING
            })
        }
        Command::Watch(args) => {
            let options = RunOptions::from_args(
                args.stages.as_deref(),
                RunType::Scheduled.as_str(),
                args.emit_events,
                args.no_registry,
                config.stage_count,
            )?;
            let interval = Duration::from_secs(args.interval_secs.max(1));
            let summary = tokio::select! {
                summary = cmd_watch(&config, &options, interval, args.max_runs, args.json) => summary?,
                _ = tokio::signal::ctrl_c() => return Err(EngineError::Cancelled),
            };
            Ok(match summary.last_passing {
                Some(false) => exit_codes::FAILING,
                _ => exit_codes::PASS,
            })
        }
        Command::Policy(PolicyCommand::Import { file }) => {
            let stored = cmd_policy_import(&config.db_path, &file)?;
            for policy in &stored {
                println!("Stored {} v{}", policy.policy_id, policy.version);
            }
            Ok(exit_codes::PASS)
        }
        Command::Policy(PolicyCommand::List { all, json }) => {
            let policies = cmd_policy_list(&config.db_path, all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&policies)?);
            } else {
                print!("{}", render_policies(&policies));
            }
            Ok(exit_codes::PASS)
        }
        Command::Policy(PolicyCommand::Deactivate { policy_id }) => {
            if cmd_policy_deactivate(&config.db_path, &policy_id)? {
                println!("Deactivated {policy_id}");
            } else {
                println!("{policy_id} has no active version");
            }
            Ok(exit_codes::PASS)
        }
        Command::Ingest { table, file } => {
            let count = cmd_ingest(&config.db_path, &table, &file)?;
            println!("Ingested {count} row(s) into {table}");
            Ok(exit_codes::PASS)
        }
        Command::Events { check_id, json } => {
            let events = cmd_events(&config.db_path, &check_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                print!("{}", render_events(&check_id, &events));
            }
            Ok(exit_codes::PASS)
        }
        Command::Serve { addr, api_key } => {
            cmd_serve(&config, &addr, api_key).await?;
            Ok(exit_codes::PASS)
        }
    }
}
