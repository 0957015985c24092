use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mrag_core::config::RagConfig;
use mrag_core::logging::init_logging;

mod commands;
mod corpus;

#[derive(Parser, Debug)]
#[command(
    name = "manualrag",
    about = "Answer questions about a technical manual with local embedding and generation models"
)]
struct Cli {
    /// Configuration file (defaults to ./manualrag.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index root directory; overrides `index.dir`
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Log level; overrides `logging.level` (MRAG_LOG takes precedence over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, validate and promote a new index from a directory of HTML pages
    Build {
        /// Root of the downloaded manual
        #[arg(long)]
        docs: PathBuf,
    },
    /// Ask a question; the answer streams to stdout
    Query {
        question: String,
        /// Print the retrieved sources to stderr after the answer
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Show the active index and whether the service is ready
    Status,
    /// Re-run validation probes against the active index
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match RagConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = cli.index_dir {
        config.index.dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Build { docs } => commands::build(&config, &docs),
        Command::Query {
            question,
            show_sources,
        } => commands::query(&config, &question, show_sources),
        Command::Status => commands::status(&config),
        Command::Validate => commands::validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.code, retryable = e.retryable, "{}", e.message);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
