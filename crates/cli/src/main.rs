//! Decentra CLI: the main entry point.
//!
//! Commands:
//! - `summary`: Summarize recent mail
//! - `tweets`: Summarize recent posts by a set of accounts
//! - `serve`: Start the HTTP server
//!
//! With `--api-url` (or `DECENTRA_API_URL`, or the older `DECEN_API_URL`)
//! the summary commands are forwarded to a running server instead of
//! executing in-process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "decentra",
    about = "Decentra: summarize your mail and feeds against your own priorities",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Forward actions to this server instead of running locally
    #[arg(long, global = true, env = "DECENTRA_API_URL")]
    api_url: Option<String>,

    /// Config file (defaults to ~/.decentra/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DECENTRA_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize recent mail
    Summary(commands::summary::SummaryArgs),

    /// Summarize recent posts by one or more accounts
    Tweets(commands::tweets::TweetsArgs),

    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so summaries can be piped
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let globals = commands::GlobalOptions {
        config: cli.config,
        api_url: commands::api_url_or_legacy(cli.api_url, |key| std::env::var(key).ok()),
    };

    match cli.command {
        Commands::Summary(args) => commands::summary::run(args, &globals).await?,
        Commands::Tweets(args) => commands::tweets::run(args, &globals).await?,
        Commands::Serve { port, host } => commands::serve::run(port, host, &globals).await?,
    }

    Ok(())
}
