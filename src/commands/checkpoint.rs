// ABOUTME: Checkpoint command - inspect or clear the stored resume position
// ABOUTME: Reset forces the next run to start from the beginning of the feed

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::sync::{Checkpoint, FileCheckpointStore};

#[derive(Args)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    command: CheckpointCommands,
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show the stored checkpoint
    Show {
        /// Path to the connector configuration file
        #[arg(long)]
        config: PathBuf,
    },
    /// Delete the stored checkpoint
    Reset {
        /// Path to the connector configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

pub async fn command(args: CheckpointArgs) -> Result<()> {
    match args.command {
        CheckpointCommands::Show { config } => {
            let config = Config::load(&config)?;
            match Checkpoint::load(&config.checkpoint.path).await? {
                Some(checkpoint) => {
                    println!("Checkpoint position: {}", checkpoint.position);
                    println!("Saved at: {}", checkpoint.saved_at.to_rfc3339());
                    if let Some(fingerprint) = checkpoint.pipeline_fingerprint {
                        println!("Pipeline fingerprint: {}", fingerprint);
                    }
                }
                None => println!("No checkpoint recorded"),
            }
        }
        CheckpointCommands::Reset { config } => {
            let config = Config::load(&config)?;
            let store = FileCheckpointStore::new(&config.checkpoint.path);
            if store.reset().await? {
                println!("Checkpoint removed: {}", store.path().display());
            } else {
                println!("No checkpoint recorded");
            }
        }
    }
    Ok(())
}
