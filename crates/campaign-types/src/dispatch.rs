//! Dispatch-side types.

use serde::{Deserialize, Serialize};

/// A serialized, channel-ready message. Built once, handed to the
/// dispatcher, then dropped; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchItem {
    broadcast_id: String,
    mobile: String,
    payload: String,
}

impl DispatchItem {
    pub fn new(
        broadcast_id: impl Into<String>,
        mobile: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            broadcast_id: broadcast_id.into(),
            mobile: mobile.into(),
            payload: payload.into(),
        }
    }

    pub fn broadcast_id(&self) -> &str {
        &self.broadcast_id
    }

    pub fn mobile(&self) -> &str {
        &self.mobile
    }

    /// The serialized message JSON.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Channel credentials of the sending business account.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub user_id: String,
    pub phone_number_id: String,
    #[serde(default)]
    pub business_account_id: Option<String>,
    pub access_token: String,
}

impl std::fmt::Debug for AccountInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountInfo")
            .field("user_id", &self.user_id)
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Aggregate outcome of one broadcast's dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub broadcast_id: String,
    /// Items handed to the dispatcher.
    pub total: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub chunks: usize,
    /// Chunks counted fully failed (transport error, rejection, panic).
    pub failed_chunks: usize,
}
