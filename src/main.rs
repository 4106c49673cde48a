// ABOUTME: CLI entry point for binlog-indexer
// ABOUTME: Parses commands and routes to appropriate handlers

use anyhow::Context;
use binlog_indexer::commands;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "binlog-indexer")]
#[command(about = "Stream MySQL binlog row changes into Elasticsearch", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index changes from a binlog notification feed until it ends or Ctrl-C
    Run {
        /// Path to the connector configuration file
        #[arg(long, env = "BINLOG_INDEXER_CONFIG")]
        config: PathBuf,
        /// JSON-lines notification feed; "-" reads from stdin
        #[arg(long, default_value = "-")]
        feed: String,
    },
    /// Check configuration and pipelines without connecting to anything
    Validate {
        /// Path to the connector configuration file
        #[arg(long, env = "BINLOG_INDEXER_CONFIG")]
        config: PathBuf,
    },
    /// Inspect or reset the stored checkpoint
    Checkpoint {
        #[command(flatten)]
        args: commands::checkpoint::CheckpointArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run { config, feed } => commands::run(&config, &feed).await,
            Commands::Validate { config } => commands::validate(&config).await,
            Commands::Checkpoint { args } => commands::checkpoint(args).await,
        }
    });

    // A pending stdin read sits on a blocking thread that cannot be cancelled;
    // waiting for it would keep the process alive after shutdown.
    runtime.shutdown_background();
    result
}
