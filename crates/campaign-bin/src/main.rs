//! Campaign dispatcher: one-shot broadcast dispatch and the scheduled
//! broadcast service.

mod app;
mod contacts;

use std::path::PathBuf;

use campaign_config_and_utils::{init_logging, init_logging_for_service, Config, Paths};
use clap::{Parser, Subcommand};

/// Campaign dispatcher command-line interface.
#[derive(Parser)]
#[command(name = "campaign-dispatcher")]
#[command(about = "Build and dispatch templated campaign broadcasts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, logs, broadcasts). Defaults to ~/.campaign
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and dispatch one broadcast, then print its summary as JSON
    Dispatch {
        /// Template definition (JSON)
        #[arg(long)]
        template: PathBuf,
        /// Recipients: a list of mobiles, or of {"mobile", "attributes"} objects
        #[arg(long)]
        recipients: PathBuf,
        /// Broadcast request (JSON, tagged with "flow")
        #[arg(long)]
        request: PathBuf,
        /// Sending account credentials (JSON)
        #[arg(long)]
        account: PathBuf,
        /// Broadcast id. Defaults to a random UUID
        #[arg(long)]
        broadcast_id: Option<String>,
    },
    /// Replay scheduled broadcasts from a directory store until interrupted
    Scheduler {
        /// Store directory. Defaults to the base directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load_unvalidated(&paths)?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    match cli.command {
        Commands::Dispatch { .. } => init_logging(&level),
        Commands::Scheduler { .. } => init_logging_for_service("campaign-scheduler", &level),
    }
    config.validate()?;

    match cli.command {
        Commands::Dispatch {
            template,
            recipients,
            request,
            account,
            broadcast_id,
        } => {
            let inputs = app::DispatchInputs {
                template,
                recipients,
                request,
                account,
                broadcast_id,
            };
            let summary = app::run_dispatch(&config, inputs).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Scheduler { store } => {
            let store_dir = store.unwrap_or_else(|| paths.base_dir().clone());
            app::run_scheduler(&config, store_dir).await?;
        }
    }

    Ok(())
}
