//! Collaborators the scheduler reads from and writes back to.

use crate::StoreResult;
use async_trait::async_trait;
use campaign_types::{AccountInfo, BroadcastStatus, ScheduledBroadcastHandle, TemplateDefinition};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Durable broadcast records.
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    /// Broadcasts in `status` with `schedule_at` inside
    /// `[now - lookback, now + lookahead]`.
    async fn find_due(
        &self,
        lookback: Duration,
        lookahead: Duration,
        status: BroadcastStatus,
    ) -> StoreResult<Vec<ScheduledBroadcastHandle>>;

    async fn save_status(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
        annotation: Option<&str>,
    ) -> StoreResult<()>;
}

/// What a replay needs besides the broadcast record itself.
#[async_trait]
pub trait ReplaySource: Send + Sync {
    async fn load_template(&self, template_id: &str) -> StoreResult<TemplateDefinition>;

    async fn account_for(&self, user_id: &str) -> StoreResult<AccountInfo>;
}

/// Inclusive `(from, to)` bounds of the polling window around `now`.
pub fn due_window(
    now: DateTime<Utc>,
    lookback: Duration,
    lookahead: Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let back = chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::zero());
    let ahead = chrono::Duration::from_std(lookahead).unwrap_or_else(|_| chrono::Duration::zero());
    (now - back, now + ahead)
}
