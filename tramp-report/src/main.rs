mod cli;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tramp::io::paths::SessionPaths;

#[derive(Parser)]
#[command(
    name = "tramp-report",
    version,
    about = "Reports over archived tramp sessions"
)]
struct Cli {
    /// Orchestrator root; archives are read from `<root>/archive`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Report {
        /// Only this target key.
        #[arg(long)]
        target: Option<String>,
        /// Print the aggregate as JSON.
        #[arg(long)]
        json: bool,
    },
    Verify,
    Clean {
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tramp::logging::init(cli.verbose);
    let archive_dir = SessionPaths::new(&cli.root, None).archive_dir;
    match cli.command {
        Command::List => cli::list_sessions(&archive_dir),
        Command::Report { target, json } => {
            cli::report_targets(&archive_dir, target.as_deref(), json)
        }
        Command::Verify => cli::verify_archives(&archive_dir),
        Command::Clean { keep } => cli::clean_archives(&archive_dir, keep),
    }
}
