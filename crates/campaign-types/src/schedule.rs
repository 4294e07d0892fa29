//! Deferred broadcasts.

use crate::request::FlowKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a scheduled broadcast.
///
/// `Pending` → `Queued` (in memory only) → `Executing` → `Succeeded` | `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastStatus {
    Pending,
    Queued,
    Executing,
    Succeeded,
    Failed,
}

impl BroadcastStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BroadcastStatus::Succeeded | BroadcastStatus::Failed)
    }
}

/// A persisted broadcast waiting for its `schedule_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledBroadcastHandle {
    pub broadcast_id: String,
    pub user_id: String,
    pub template_id: String,
    pub schedule_at: DateTime<Utc>,
    pub flow: FlowKind,
    /// The original request, untagged (see `BroadcastRequest::to_persisted`).
    #[serde(default)]
    pub request_json: Option<String>,
    /// Recipient column, used when no request JSON was persisted.
    #[serde(default)]
    pub mobiles: Vec<String>,
}

impl ScheduledBroadcastHandle {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule_at <= now
    }
}
