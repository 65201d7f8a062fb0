//! Exploratory-test orchestrator CLI.
//!
//! Sessions live under `--root` (default: current directory): `tramp.toml`
//! configures them, `session/` (or `session-<n>`) holds the live session and
//! `archive/` the finished ones.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use tramp::driver::{Driver, DriverStop};
use tramp::exit_codes;
use tramp::io::app::Catalog;
use tramp::io::config::{TrampConfig, load_config, write_config};
use tramp::io::paths::SessionPaths;
use tramp::io::replay::ReplayApp;
use tramp::io::store::SessionStore;
use tramp::session::Session;

#[derive(Parser)]
#[command(
    name = "tramp",
    version,
    about = "Exploratory-test orchestrator for slot game clients"
)]
struct Cli {
    /// Directory holding `tramp.toml`, the session and the archive.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Raise the stderr log level (`-v` info, `-vv` debug). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `tramp.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Queue targets for testing, validated against a trace's catalog.
    Enqueue {
        #[arg(required = true)]
        keys: Vec<String>,
        /// Recorded trace whose catalog lists the known targets.
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Print the session's queue, targets and severity totals.
    Status,
    /// Drive the queued runs against a recorded trace.
    Replay {
        trace: PathBuf,
        /// Seconds of application time per tick.
        #[arg(long, default_value_t = 1.0)]
        dt: f64,
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Finish the session and move it into the archive.
    Archive,
}

/// Accepts every key; used to reopen a session without the application.
struct OfflineCatalog;

impl Catalog for OfflineCatalog {
    fn target_name(&self, key: &str) -> Option<String> {
        Some(key.to_string())
    }
}

fn main() {
    let cli = Cli::parse();
    tramp::logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Enqueue { keys, catalog } => cmd_enqueue(&root, &keys, &catalog),
        Command::Status => cmd_status(&root),
        Command::Replay { trace, dt, max_ticks } => cmd_replay(&root, &trace, dt, max_ticks),
        Command::Archive => cmd_archive(&root),
    }
}

fn load(root: &Path) -> Result<(TrampConfig, SessionPaths)> {
    let config_path = SessionPaths::new(root, None).config_path;
    let config = load_config(&config_path)?;
    let paths = SessionPaths::new(root, config.session.instance);
    Ok((config, paths))
}

/// Resume the persisted session, or start a new one.
fn open_session(config: &TrampConfig, paths: SessionPaths, catalog: &dyn Catalog) -> Result<Session> {
    let store = SessionStore::new(paths);
    if store.paths().session_exists() {
        debug!(path = %store.paths().session_path.display(), "resuming session");
        return Session::resume(config, store, catalog).context("resume session");
    }
    let session = Session::new(config, Some(store));
    session.checkpoint();
    Ok(session)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = SessionPaths::new(root, None).config_path;
    if force || !path.exists() {
        write_config(&path, &TrampConfig::default())?;
    }
    println!("init: config={}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_enqueue(root: &Path, keys: &[String], catalog: &Path) -> Result<i32> {
    let (config, paths) = load(root)?;
    let catalog = ReplayApp::load(catalog)?;
    let mut session = open_session(&config, paths, &catalog)?;
    for key in keys {
        if session.enqueue(&catalog, key).is_some() {
            println!("enqueue: queued {key}");
        } else {
            eprintln!("warning: unknown target {key}");
        }
    }
    session.checkpoint();
    println!("enqueue: pending={}", session.pending_len());
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path) -> Result<i32> {
    let (_, paths) = load(root)?;
    let store = SessionStore::new(paths);
    let Some(record) = store.load_session()? else {
        println!("status: no session at {}", store.paths().session_dir.display());
        return Ok(exit_codes::OK);
    };
    let plan = store.load_plan()?.unwrap_or_default();

    println!(
        "status: session={} branch={} targets={}",
        record.session_id,
        record.branch,
        record.targets.len()
    );
    if let Some(active) = &plan.active {
        println!(
            "status: active={} iteration={} executed={} remaining={}",
            active.target_key,
            active.index,
            active.executed_actions.len(),
            active.remaining_actions.remaining()
        );
    }
    println!("status: pending={}", plan.pending.join(","));
    for target in record.targets.values() {
        let Some(averaged) = target.averaged_statistics() else {
            continue;
        };
        println!(
            "status: target {} iterations={} warnings={} errors={} exceptions={} severity={}",
            target.key,
            target.runs.len(),
            averaged.warnings,
            averaged.errors,
            averaged.exceptions,
            averaged.severity_class().label()
        );
    }
    let totals = record.totals;
    println!(
        "status: clean={} warning={} error={} exception={}",
        totals.clean, totals.warning, totals.error, totals.exception
    );
    println!("status: lobby_logs={}", record.lobby_logs.len());
    Ok(exit_codes::OK)
}

fn cmd_replay(root: &Path, trace: &Path, dt: f64, max_ticks: Option<u64>) -> Result<i32> {
    let (config, paths) = load(root)?;
    let mut app = ReplayApp::load(trace)?;
    let mut session = open_session(&config, paths, &app)?;
    let mut driver = Driver::new(config.timing.clone());
    let outcome = driver.run_guarded(&mut session, &mut app, dt, max_ticks)?;

    println!(
        "replay: stop={:?} ticks={} restarts={} commands={}",
        outcome.stop,
        outcome.ticks,
        outcome.restarts,
        app.commands().len()
    );
    let code = match outcome.stop {
        DriverStop::QueueEmpty | DriverStop::Stopped => exit_codes::OK,
        DriverStop::ApplicationExited | DriverStop::TickLimit => exit_codes::INCOMPLETE,
        DriverStop::TooManyRestarts => exit_codes::UNSTABLE,
    };
    Ok(code)
}

fn cmd_archive(root: &Path) -> Result<i32> {
    let (config, paths) = load(root)?;
    if !paths.session_exists() {
        bail!("no session to archive at {}", paths.session_dir.display());
    }
    let session = open_session(&config, paths, &OfflineCatalog)?;
    let dest = session.archive()?;
    println!("archive: {}", dest.display());
    Ok(exit_codes::OK)
}
