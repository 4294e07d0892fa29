//! Concurrent chunked dispatch.
//!
//! Items are split into chunks of `dispatch_chunk_size` and every chunk is
//! spawned at once; a semaphore bounds how many are talking to the channel.
//! Accounting is per chunk: a transport error, a rejected chunk or a panic in
//! the send task counts every item of that chunk as failed.

use crate::{ChannelClient, SendOutcome};
use campaign_config_and_utils::PipelineSettings;
use campaign_types::{AccountInfo, DispatchItem, DispatchSummary};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Invoked once with the aggregate summary after every chunk has finished.
pub type CompletionCallback = Box<dyn FnOnce(DispatchSummary) + Send + 'static>;

/// Result of one chunk task.
#[derive(Debug, Clone, Copy)]
struct ChunkResult {
    dispatched: usize,
    failed: usize,
    chunk_failed: bool,
}

impl ChunkResult {
    fn sent(outcome: SendOutcome) -> Self {
        Self {
            dispatched: outcome.dispatched,
            failed: outcome.failed,
            chunk_failed: false,
        }
    }

    fn failed(size: usize) -> Self {
        Self {
            dispatched: 0,
            failed: size,
            chunk_failed: true,
        }
    }
}

/// Handle to a running dispatch. Dropping it does not cancel anything.
pub struct DispatchHandle {
    broadcast_id: String,
    total: usize,
    task: JoinHandle<DispatchSummary>,
}

impl DispatchHandle {
    pub fn broadcast_id(&self) -> &str {
        &self.broadcast_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the aggregate summary.
    pub async fn wait(self) -> DispatchSummary {
        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(broadcast_id = %self.broadcast_id, error = %e, "Dispatch aggregation task failed");
                DispatchSummary {
                    broadcast_id: self.broadcast_id,
                    total: self.total,
                    failed: self.total,
                    ..Default::default()
                }
            }
        }
    }
}

/// Fans dispatch chunks out to the channel client.
pub struct DispatchCoordinator {
    client: Arc<dyn ChannelClient>,
    chunk_size: usize,
    permits: Arc<Semaphore>,
}

impl DispatchCoordinator {
    pub fn new(settings: PipelineSettings, client: Arc<dyn ChannelClient>) -> Self {
        Self {
            client,
            chunk_size: settings.dispatch_chunk_size.max(1),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_chunks.max(1))),
        }
    }

    /// Submit every chunk and return immediately.
    ///
    /// Must be called from within a tokio runtime. The summary is delivered to
    /// `on_complete` and through the returned handle.
    pub fn dispatch_all(
        &self,
        items: Vec<DispatchItem>,
        account: AccountInfo,
        broadcast_id: &str,
        on_complete: Option<CompletionCallback>,
    ) -> DispatchHandle {
        let total = items.len();
        let account = Arc::new(account);
        let chunks = split_chunks(items, self.chunk_size);

        let mut tasks = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let size = chunk.len();
            let client = self.client.clone();
            let account = account.clone();
            let permits = self.permits.clone();
            let broadcast_id = broadcast_id.to_string();

            let task = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                send_chunk(client.as_ref(), &chunk, &account, &broadcast_id, index).await
            });
            tasks.push((index, size, task));
        }

        debug!(broadcast_id = %broadcast_id, items = total, chunks = tasks.len(), "Dispatch submitted");

        let summary_id = broadcast_id.to_string();
        let task = tokio::spawn(async move {
            let mut summary = DispatchSummary {
                broadcast_id: summary_id,
                total,
                chunks: tasks.len(),
                ..Default::default()
            };

            for (index, size, task) in tasks {
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(broadcast_id = %summary.broadcast_id, chunk = index, error = %e, "Chunk task panicked");
                        ChunkResult::failed(size)
                    }
                };
                summary.dispatched += result.dispatched;
                summary.failed += result.failed;
                if result.chunk_failed {
                    summary.failed_chunks += 1;
                }
            }

            info!(
                broadcast_id = %summary.broadcast_id,
                total = summary.total,
                dispatched = summary.dispatched,
                failed = summary.failed,
                failed_chunks = summary.failed_chunks,
                "Dispatch complete"
            );

            if let Some(callback) = on_complete {
                let delivered = summary.clone();
                if std::panic::catch_unwind(AssertUnwindSafe(|| callback(delivered))).is_err() {
                    error!(broadcast_id = %summary.broadcast_id, "Completion callback panicked");
                }
            }
            summary
        });

        DispatchHandle {
            broadcast_id: broadcast_id.to_string(),
            total,
            task,
        }
    }
}

fn split_chunks(items: Vec<DispatchItem>, chunk_size: usize) -> Vec<Vec<DispatchItem>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut items = items.into_iter();
    loop {
        let chunk: Vec<DispatchItem> = items.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    chunks
}

async fn send_chunk(
    client: &dyn ChannelClient,
    chunk: &[DispatchItem],
    account: &AccountInfo,
    broadcast_id: &str,
    index: usize,
) -> ChunkResult {
    match client.send(chunk, account).await {
        Ok(outcome) if outcome.success => {
            debug!(
                broadcast_id = %broadcast_id,
                chunk = index,
                dispatched = outcome.dispatched,
                failed = outcome.failed,
                "Chunk sent"
            );
            ChunkResult::sent(outcome)
        }
        Ok(_) => {
            warn!(broadcast_id = %broadcast_id, chunk = index, size = chunk.len(), "Channel refused chunk");
            ChunkResult::failed(chunk.len())
        }
        Err(e) => {
            warn!(broadcast_id = %broadcast_id, chunk = index, size = chunk.len(), error = %e, "Chunk send failed");
            ChunkResult::failed(chunk.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelError, ChannelResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Accepts everything, failing or panicking on chunks that start with a
    /// marked mobile.
    struct ScriptedClient {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
        refuse_on: Option<&'static str>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
                panic_on: None,
                refuse_on: None,
            }
        }
    }

    #[async_trait]
    impl ChannelClient for ScriptedClient {
        async fn send(&self, chunk: &[DispatchItem], _account: &AccountInfo) -> ChannelResult<SendOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let first = chunk.first().map(DispatchItem::mobile);
            if first.is_some() && first == self.panic_on {
                panic!("channel client bug");
            }
            if first.is_some() && first == self.fail_on {
                return Err(ChannelError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            if first.is_some() && first == self.refuse_on {
                return Ok(SendOutcome::default());
            }
            Ok(SendOutcome::accepted(chunk.len()))
        }
    }

    fn account() -> AccountInfo {
        AccountInfo {
            user_id: "u-1".into(),
            phone_number_id: "pn-1".into(),
            business_account_id: None,
            access_token: "token".into(),
        }
    }

    fn items(n: usize) -> Vec<DispatchItem> {
        (0..n)
            .map(|i| DispatchItem::new("b-1", format!("m-{i}"), "{}"))
            .collect()
    }

    fn coordinator(client: Arc<ScriptedClient>, chunk_size: usize) -> DispatchCoordinator {
        DispatchCoordinator::new(
            PipelineSettings {
                dispatch_chunk_size: chunk_size,
                max_concurrent_chunks: 2,
                ..PipelineSettings::default()
            },
            client,
        )
    }

    #[test]
    fn test_split_chunks_keeps_order_and_remainder() {
        let chunks = split_chunks(items(250), 100);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(chunks[1][0].mobile(), "m-100");
        assert!(split_chunks(vec![], 100).is_empty());
    }

    #[tokio::test]
    async fn test_all_chunks_dispatched() {
        let client = Arc::new(ScriptedClient::new());
        let handle = coordinator(client.clone(), 100).dispatch_all(items(250), account(), "b-1", None);

        let summary = handle.wait().await;

        assert_eq!(summary.total, 250);
        assert_eq!(summary.dispatched, 250);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.chunks, 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_affect_siblings() {
        let client = Arc::new(ScriptedClient {
            fail_on: Some("m-100"),
            ..ScriptedClient::new()
        });
        let summary = coordinator(client, 100)
            .dispatch_all(items(250), account(), "b-1", None)
            .wait()
            .await;

        assert_eq!(summary.dispatched, 150);
        assert_eq!(summary.failed, 100);
        assert_eq!(summary.failed_chunks, 1);
    }

    #[tokio::test]
    async fn test_panicking_chunk_counted_failed() {
        let client = Arc::new(ScriptedClient {
            panic_on: Some("m-0"),
            ..ScriptedClient::new()
        });
        let summary = coordinator(client, 10)
            .dispatch_all(items(25), account(), "b-1", None)
            .wait()
            .await;

        assert_eq!(summary.dispatched, 15);
        assert_eq!(summary.failed, 10);
        assert_eq!(summary.failed_chunks, 1);
    }

    #[tokio::test]
    async fn test_refused_chunk_counted_failed() {
        let client = Arc::new(ScriptedClient {
            refuse_on: Some("m-20"),
            ..ScriptedClient::new()
        });
        let summary = coordinator(client, 10)
            .dispatch_all(items(25), account(), "b-1", None)
            .wait()
            .await;

        assert_eq!(summary.dispatched, 20);
        assert_eq!(summary.failed, 5);
    }

    #[tokio::test]
    async fn test_callback_receives_summary() {
        let (tx, rx) = oneshot::channel();
        let callback: CompletionCallback = Box::new(move |summary| {
            let _ = tx.send(summary);
        });

        let handle = coordinator(Arc::new(ScriptedClient::new()), 100).dispatch_all(
            items(3),
            account(),
            "b-7",
            Some(callback),
        );

        let delivered = rx.await.unwrap();
        assert_eq!(delivered.broadcast_id, "b-7");
        assert_eq!(delivered.dispatched, 3);
        assert_eq!(handle.wait().await, delivered);
    }

    #[tokio::test]
    async fn test_empty_dispatch_completes() {
        let summary = coordinator(Arc::new(ScriptedClient::new()), 100)
            .dispatch_all(vec![], account(), "b-1", None)
            .wait()
            .await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.chunks, 0);
    }
}
