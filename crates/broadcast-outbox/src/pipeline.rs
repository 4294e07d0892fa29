//! Broadcast pipeline entry point.

use crate::{
    AttributeLookup, BatchBuilder, BuildResult, ChannelClient, CompletionCallback,
    DispatchCoordinator, DispatchHandle,
};
use campaign_config_and_utils::PipelineSettings;
use campaign_types::{AccountInfo, BroadcastRequest, TemplateDefinition};
use std::sync::Arc;
use tracing::info;

/// Builds a broadcast and hands it to the dispatch coordinator.
pub struct BroadcastPipeline {
    builder: BatchBuilder,
    coordinator: DispatchCoordinator,
}

impl BroadcastPipeline {
    pub fn new(
        settings: PipelineSettings,
        attributes: Arc<dyn AttributeLookup>,
        client: Arc<dyn ChannelClient>,
    ) -> Self {
        Self {
            builder: BatchBuilder::new(settings, attributes),
            coordinator: DispatchCoordinator::new(settings, client),
        }
    }

    pub fn builder(&self) -> &BatchBuilder {
        &self.builder
    }

    pub fn coordinator(&self) -> &DispatchCoordinator {
        &self.coordinator
    }

    /// Build and submit one broadcast.
    ///
    /// Setup errors (no recipients, misconfigured template) are returned before
    /// anything is built. Otherwise the call returns once every dispatch chunk
    /// is submitted; the outcome arrives through `on_complete` and the handle.
    pub async fn submit(
        &self,
        template: &TemplateDefinition,
        recipients: &[String],
        request: &BroadcastRequest,
        broadcast_id: &str,
        account: AccountInfo,
        on_complete: Option<CompletionCallback>,
    ) -> BuildResult<DispatchHandle> {
        info!(
            broadcast_id = %broadcast_id,
            template = %template.name,
            flow = %request.flow(),
            recipients = recipients.len(),
            "Submitting broadcast"
        );

        let report = self
            .builder
            .build_all(recipients, template, request, broadcast_id)
            .await?;

        Ok(self
            .coordinator
            .dispatch_all(report.items, account, broadcast_id, on_complete))
    }
}
