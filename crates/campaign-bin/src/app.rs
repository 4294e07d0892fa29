//! Command implementations.

use crate::contacts::{parse_recipients, ContactDirectory, StaticAttributes};
use broadcast_outbox::{AttributeLookup, BroadcastPipeline, HttpChannelClient};
use campaign_config_and_utils::Config;
use campaign_types::{AccountInfo, BroadcastRequest, DispatchSummary, TemplateDefinition};
use scheduled_broadcast_queue::{BroadcastExecutor, BroadcastScheduler, DirectoryStore};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

type AppResult<T> = Result<T, Box<dyn Error>>;

/// Input files of a one-shot dispatch.
pub struct DispatchInputs {
    pub template: PathBuf,
    pub recipients: PathBuf,
    pub request: PathBuf,
    pub account: PathBuf,
    pub broadcast_id: Option<String>,
}

/// Build and dispatch one broadcast and wait for its outcome.
pub async fn run_dispatch(config: &Config, inputs: DispatchInputs) -> AppResult<DispatchSummary> {
    let template: TemplateDefinition = read_json(&inputs.template).await?;
    let request: BroadcastRequest = read_json(&inputs.request).await?;
    let account: AccountInfo = read_json(&inputs.account).await?;
    let (recipients, attributes) = parse_recipients(&read_file(&inputs.recipients).await?)?;

    let broadcast_id = inputs
        .broadcast_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let pipeline = pipeline(config, Arc::new(StaticAttributes::new(attributes)))?;
    let handle = pipeline
        .submit(&template, &recipients, &request, &broadcast_id, account, None)
        .await?;

    let summary = handle.wait().await;
    info!(
        broadcast_id = %summary.broadcast_id,
        dispatched = summary.dispatched,
        failed = summary.failed,
        "Dispatch finished"
    );
    Ok(summary)
}

/// Run the scheduler against a directory store until Ctrl-C.
pub async fn run_scheduler(config: &Config, store_dir: PathBuf) -> AppResult<()> {
    let store = Arc::new(DirectoryStore::new(&store_dir));
    store.ensure_dirs().await?;

    let contacts = Arc::new(ContactDirectory::new(store_dir.join("contacts")));
    let pipeline = Arc::new(pipeline(config, contacts)?);
    let executor = Arc::new(BroadcastExecutor::new(pipeline, store.clone(), store.clone()));

    info!(store = %store_dir.display(), "Starting scheduler");
    let scheduler = BroadcastScheduler::new(config.scheduler_config(), store, executor).start();

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, stopping scheduler");
    scheduler.shutdown().await;
    Ok(())
}

fn pipeline(config: &Config, attributes: Arc<dyn AttributeLookup>) -> AppResult<BroadcastPipeline> {
    let client = HttpChannelClient::new(&config.channel)?;
    Ok(BroadcastPipeline::new(
        config.pipeline_config(),
        attributes,
        Arc::new(client),
    ))
}

async fn read_file(path: &Path) -> AppResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()).into())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let content = read_file(path).await?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()).into())
}
