use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use dealdesk::analyst::HttpAnalyst;
use dealdesk::config::{default_config_path, Config};
use dealdesk::memo_store::MemoStore;
use dealdesk::resolve::Resolver;
use dealdesk::sync;

#[derive(Parser)]
#[command(name = "dealdesk", version, about = "Accelerator application triage")]
struct Cli {
    /// Config file (default: ~/.dealdesk/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the sheet, reconcile, and enrich new submissions.
    ///
    /// Not safe to run concurrently with itself — overlapping passes can
    /// enrich the same submission twice.
    Sync {
        /// Override the configured per-pass enrichment cap.
        #[arg(long)]
        max_batch: Option<usize>,
    },
    /// Report new submissions and inconsistencies; write nothing.
    Reconcile,
    /// Rebuild the token ledger from memo files plus a fresh snapshot.
    RebuildLedger,
    /// Fill missing tokens and submission dates on existing memos.
    Backfill,
    /// Resolve a display name to its memo filename.
    Resolve { name: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Command::Sync { max_batch } => {
            let analyst = HttpAnalyst::new(&config.analyst)?;
            let cap = max_batch.unwrap_or(config.max_batch);
            let result = sync::run_sync(&config, cap, &analyst)?;
            print_json(&result.summary)?;
            if result.report.has_inconsistencies() {
                print_json(&result.report)?;
            }
        }
        Command::Reconcile => {
            let report = sync::run_reconcile(&config)?;
            print_json(&report)?;
        }
        Command::RebuildLedger => {
            let ledger = sync::run_rebuild(&config)?;
            print_json(&ledger)?;
        }
        Command::Backfill => {
            let outcome = sync::run_backfill(&config)?;
            print_json(&outcome)?;
        }
        Command::Resolve { name } => {
            let store = MemoStore::new(&config.analysis_dir);
            let resolver = Resolver::new(&config.aliases, store.filenames()?)?;
            match resolver.resolve(&name) {
                Ok(filename) => println!("{filename}"),
                Err(miss) => {
                    eprintln!("{miss}");
                    for stem in &miss.known {
                        eprintln!("  {stem}");
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
