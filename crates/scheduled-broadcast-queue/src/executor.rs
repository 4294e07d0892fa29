//! Replay of a scheduled broadcast through the normal pipeline.

use crate::{BroadcastStore, ReplayError, ReplayResult, ReplaySource};
use async_trait::async_trait;
use broadcast_outbox::{BroadcastPipeline, CompletionCallback, DispatchHandle};
use campaign_types::{
    AuthenticationBroadcastRequest, BroadcastRequest, BroadcastStatus, CsvBroadcastRequest,
    CsvRow, DispatchSummary, FlowKind, MessageOptions, NormalBroadcastRequest,
    ScheduledBroadcastHandle, VariableOverrides,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Executes one released broadcast.
#[async_trait]
pub trait ExecuteBroadcast: Send + Sync {
    async fn execute_broadcast(&self, handle: &ScheduledBroadcastHandle) -> ReplayResult<()>;
}

/// Rebuilds the persisted request and submits it to the pipeline, writing the
/// broadcast's status back as it goes.
pub struct BroadcastExecutor {
    pipeline: Arc<BroadcastPipeline>,
    store: Arc<dyn BroadcastStore>,
    source: Arc<dyn ReplaySource>,
}

impl BroadcastExecutor {
    pub fn new(
        pipeline: Arc<BroadcastPipeline>,
        store: Arc<dyn BroadcastStore>,
        source: Arc<dyn ReplaySource>,
    ) -> Self {
        Self {
            pipeline,
            store,
            source,
        }
    }

    /// The request to replay: the persisted JSON when present, otherwise a
    /// minimal request from the broadcast's own columns.
    pub fn reconstruct(handle: &ScheduledBroadcastHandle) -> ReplayResult<BroadcastRequest> {
        if let Some(json) = handle.request_json.as_deref().filter(|j| !j.trim().is_empty()) {
            return BroadcastRequest::from_persisted(handle.flow, json)
                .map_err(|e| ReplayError::Reconstruction(e.to_string()));
        }

        let template_id = handle.template_id.clone();
        let user_id = handle.user_id.clone();
        let schedule_at = Some(handle.schedule_at);

        Ok(match handle.flow {
            FlowKind::Normal => BroadcastRequest::Normal(NormalBroadcastRequest {
                template_id,
                user_id,
                mobiles: handle.mobiles.clone(),
                variables: VariableOverrides::default(),
                options: MessageOptions::default(),
                schedule_at,
            }),
            FlowKind::Csv => BroadcastRequest::Csv(CsvBroadcastRequest {
                template_id,
                user_id,
                rows: handle
                    .mobiles
                    .iter()
                    .map(|mobile| CsvRow {
                        mobile: mobile.clone(),
                        variables: VariableOverrides::default(),
                    })
                    .collect(),
                variables: VariableOverrides::default(),
                options: MessageOptions::default(),
                schedule_at,
            }),
            FlowKind::Authentication => {
                BroadcastRequest::Authentication(AuthenticationBroadcastRequest {
                    template_id,
                    user_id,
                    mobiles: handle.mobiles.clone(),
                    otp: None,
                    options: MessageOptions::default(),
                    schedule_at,
                })
            }
        })
    }

    /// Replay one broadcast. Any failure before dispatch marks it `Failed`
    /// with the error as annotation; dispatch outcome is written back from the
    /// completion callback.
    pub async fn execute(&self, handle: &ScheduledBroadcastHandle) -> ReplayResult<DispatchHandle> {
        let broadcast_id = handle.broadcast_id.as_str();

        let result = match self
            .store
            .save_status(broadcast_id, BroadcastStatus::Executing, None)
            .await
        {
            Ok(()) => self.submit(handle).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            warn!(broadcast_id = %broadcast_id, error = %e, "Scheduled broadcast failed");
            let annotation = e.to_string();
            if let Err(store_err) = self
                .store
                .save_status(broadcast_id, BroadcastStatus::Failed, Some(&annotation))
                .await
            {
                error!(broadcast_id = %broadcast_id, error = %store_err, "Cannot mark broadcast failed");
            }
        }
        result
    }

    async fn submit(&self, handle: &ScheduledBroadcastHandle) -> ReplayResult<DispatchHandle> {
        let request = Self::reconstruct(handle)?;
        let template = self.source.load_template(request.template_id()).await?;
        let account = self.source.account_for(request.user_id()).await?;
        let recipients = request.mobiles();

        info!(
            broadcast_id = %handle.broadcast_id,
            flow = %request.flow(),
            recipients = recipients.len(),
            "Replaying scheduled broadcast"
        );

        let dispatch = self
            .pipeline
            .submit(
                &template,
                &recipients,
                &request,
                &handle.broadcast_id,
                account,
                Some(self.status_callback()),
            )
            .await?;
        Ok(dispatch)
    }

    fn status_callback(&self) -> CompletionCallback {
        let store = self.store.clone();
        Box::new(move |summary: DispatchSummary| {
            tokio::spawn(async move {
                let (status, annotation) = final_status(&summary);
                if let Err(e) = store
                    .save_status(&summary.broadcast_id, status, annotation.as_deref())
                    .await
                {
                    error!(broadcast_id = %summary.broadcast_id, error = %e, "Cannot record dispatch outcome");
                }
            });
        })
    }
}

/// Terminal status from a dispatch summary. A broadcast succeeds if anything
/// went out, or if there was nothing to send.
fn final_status(summary: &DispatchSummary) -> (BroadcastStatus, Option<String>) {
    if summary.dispatched > 0 || summary.total == 0 {
        (BroadcastStatus::Succeeded, None)
    } else {
        (
            BroadcastStatus::Failed,
            Some(format!("all {} messages failed", summary.total)),
        )
    }
}

#[async_trait]
impl ExecuteBroadcast for BroadcastExecutor {
    async fn execute_broadcast(&self, handle: &ScheduledBroadcastHandle) -> ReplayResult<()> {
        self.execute(handle).await.map(|_| ())
    }
}
