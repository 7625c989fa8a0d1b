//! # repo-chat CLI (`rchat`)
//!
//! Ask questions about a code repository. `rchat ingest` builds a vector
//! index from a local checkout or a remote git URL; `rchat ask` and
//! `rchat chat` answer questions from it with conversation memory.
//!
//! ## Usage
//!
//! ```bash
//! rchat --config ./config/rchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rchat ingest <repo>` | Rebuild the index from a directory or git URL |
//! | `rchat status` | Show what the index holds |
//! | `rchat search "<query>"` | Show the chunks a query would retrieve |
//! | `rchat ask "<question>"` | Answer one question |
//! | `rchat chat` | Interactive conversation |
//!
//! ## Logging
//!
//! Logs go to stderr. `-v` raises the level (info, debug, trace), `-q`
//! limits output to errors, and `RCHAT_LOG` takes any `tracing` filter
//! directive (e.g. `RCHAT_LOG=repo_chat_core=debug`).

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use repo_chat::config::{self, Config};
use repo_chat::progress::ProgressMode;
use repo_chat::{chat, ingest, search, status};

const DEFAULT_CONFIG: &str = "./config/rchat.toml";

/// repo-chat: retrieval-augmented Q&A over a source repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rchat",
    about = "repo-chat: ask questions about a source repository",
    version,
    long_about = "repo-chat collects the text files of a repository, splits them into \
    overlapping chunks, embeds them into a local SQLite index, and answers questions with \
    diverse (MMR) retrieval and a rolling conversation summary."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the default path does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// More log output (repeat for debug and trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from a repository.
    ///
    /// Accepts a local directory or a git URL. The previous index is wiped
    /// first; a failed run leaves no index rather than a partial one.
    Ingest {
        /// Local path or remote git URL.
        repo: String,

        /// Progress on stderr: human, json, or off. Defaults to human when
        /// stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show the index location, source repository, model and chunk count.
    Status,

    /// Print the chunks retrieval would select for a query.
    Search {
        query: String,

        /// Number of chunks to select (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Print the answer and its sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive conversation.
    Chat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("RCHAT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config file; only the default path may be absent.
fn resolve_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { repo, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();
            ingest::run_ingest(&cfg, &repo, reporter.as_ref()).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Ask { question, json } => {
            chat::run_ask(&cfg, &question, json).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
