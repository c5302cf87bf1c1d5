use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlpilot::cli::commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sqlpilot")]
#[command(about = "Retrieval-augmented SQL suggestions shown as ghost text")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), ", courtesy of Kernelle Software"))]
struct Cli {
  /// Configuration file (defaults to params.yaml, .sqlpilot.yaml, then the user config dir)
  #[arg(short, long, global = true, env = "SQLPILOT_CONFIG")]
  config: Option<PathBuf>,

  /// Raise log verbosity
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Start an interactive suggestion session on stdin
  Run {
    /// Window title reported with every capture
    #[arg(short, long)]
    window: Option<String>,
  },
  /// Generate one suggestion and print it with its latency
  Suggest {
    #[arg(required = true)]
    text: Vec<String>,
  },
  /// Show the examples retrieval would feed the model
  Search {
    #[arg(required = true)]
    text: Vec<String>,
    /// Number of examples to return
    #[arg(short = 'k', long, default_value = "3")]
    top_k: usize,
  },
  /// Acceptance and latency statistics per model
  Stats {
    /// Suggestion log to read (defaults to the configured log path)
    #[arg(long)]
    log: Option<PathBuf>,
  },
}

async fn handle(command: Command, config: Option<PathBuf>) -> Result<()> {
  let config = config.as_deref();
  match command {
    Command::Run { window } => commands::run_session(config, window).await,
    Command::Suggest { text } => commands::suggest(config, &text.join(" ")).await,
    Command::Search { text, top_k } => commands::search(config, &text.join(" "), top_k).await,
    Command::Stats { log } => commands::stats(config, log),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  bentley::init(cli.verbose);

  handle(cli.command, cli.config).await
}
