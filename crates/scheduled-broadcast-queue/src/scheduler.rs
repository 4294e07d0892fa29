//! Poller and releaser tasks.
//!
//! The poller asks the store for pending broadcasts on a fixed interval and
//! forwards each result to the releaser over a channel. The releaser owns the
//! [`ScheduledQueue`]: it merges poll results, and on its own interval drains
//! every due entry from the head, executing each inline. An execution error or
//! panic is logged and the loop continues.

use crate::{BroadcastStore, ExecuteBroadcast, ScheduledQueue};
use campaign_config_and_utils::SchedulerSettings;
use campaign_types::{BroadcastStatus, ScheduledBroadcastHandle};
use chrono::Utc;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const POLL_CHANNEL_CAPACITY: usize = 16;

/// Replays deferred broadcasts once they are due.
pub struct BroadcastScheduler {
    settings: SchedulerSettings,
    store: Arc<dyn BroadcastStore>,
    executor: Arc<dyn ExecuteBroadcast>,
}

/// Running scheduler. Dropping it leaves the tasks running; call
/// [`SchedulerHandle::shutdown`] to stop them.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    poller: JoinHandle<()>,
    releaser: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop both loops and wait for them. A broadcast being executed finishes
    /// first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.poller.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
        if let Err(e) = self.releaser.await {
            warn!(error = %e, "Releaser task ended abnormally");
        }
        info!("Scheduler stopped");
    }
}

impl BroadcastScheduler {
    pub fn new(
        settings: SchedulerSettings,
        store: Arc<dyn BroadcastStore>,
        executor: Arc<dyn ExecuteBroadcast>,
    ) -> Self {
        Self {
            settings,
            store,
            executor,
        }
    }

    /// Spawn the poller and releaser.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);

        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            release_interval_ms = self.settings.release_interval_ms,
            lookback_minutes = self.settings.lookback().as_secs() / 60,
            lookahead_minutes = self.settings.lookahead().as_secs() / 60,
            "Scheduler started"
        );

        let poller = tokio::spawn(run_poller(
            self.settings,
            self.store.clone(),
            poll_tx,
            shutdown_tx.subscribe(),
        ));
        let releaser = tokio::spawn(run_releaser(
            self.settings,
            self.executor.clone(),
            poll_rx,
            shutdown_tx.subscribe(),
        ));

        SchedulerHandle {
            shutdown_tx,
            poller,
            releaser,
        }
    }
}

async fn run_poller(
    settings: SchedulerSettings,
    store: Arc<dyn BroadcastStore>,
    poll_tx: mpsc::Sender<Vec<ScheduledBroadcastHandle>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let found = store
                    .find_due(settings.lookback(), settings.lookahead(), BroadcastStatus::Pending)
                    .await;
                match found {
                    Ok(handles) if handles.is_empty() => debug!("No pending broadcasts in window"),
                    Ok(handles) => {
                        debug!(count = handles.len(), "Polled pending broadcasts");
                        if poll_tx.send(handles).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Polling pending broadcasts failed"),
                }
            }
        }
    }
}

async fn run_releaser(
    settings: SchedulerSettings,
    executor: Arc<dyn ExecuteBroadcast>,
    mut poll_rx: mpsc::Receiver<Vec<ScheduledBroadcastHandle>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut queue = ScheduledQueue::new();
    let mut ticker = interval(settings.release_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poller_open = true;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            polled = poll_rx.recv(), if poller_open => match polled {
                Some(handles) => {
                    let added = queue.offer(handles);
                    if added > 0 {
                        debug!(added, queued = queue.len(), "Queued scheduled broadcasts");
                    }
                }
                None => poller_open = false,
            },
            _ = ticker.tick() => {
                release_due(&mut queue, executor.as_ref()).await;
                if let Some(cutoff) = chrono::Duration::from_std(settings.lookback())
                    .ok()
                    .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
                {
                    queue.forget_executed_before(cutoff);
                }
            }
        }
    }
}

/// Execute every due entry from the head of the queue.
async fn release_due(queue: &mut ScheduledQueue, executor: &dyn ExecuteBroadcast) {
    while let Some(handle) = queue.pop_due(Utc::now()) {
        queue.mark_executed(&handle.broadcast_id, Utc::now());
        debug!(broadcast_id = %handle.broadcast_id, schedule_at = %handle.schedule_at, "Releasing broadcast");

        match AssertUnwindSafe(executor.execute_broadcast(&handle))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => info!(broadcast_id = %handle.broadcast_id, "Scheduled broadcast submitted"),
            Ok(Err(e)) => warn!(broadcast_id = %handle.broadcast_id, error = %e, "Scheduled broadcast execution failed"),
            Err(_) => error!(broadcast_id = %handle.broadcast_id, "Scheduled broadcast execution panicked"),
        }
    }

    if let Some(head) = queue.peek() {
        debug!(broadcast_id = %head.broadcast_id, schedule_at = %head.schedule_at, "Queue head not due yet");
    }
}
