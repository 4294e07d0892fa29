//! Broadcast requests.
//!
//! The three flows share [`MessageOptions`] and differ in where placeholder
//! values come from:
//!
//! - `NORMAL`: one shared [`VariableOverrides`] set for every mobile.
//! - `CSV`: one row per recipient with its own overrides, plus a global set.
//! - `AUTHENTICATION`: a one-time code injected into body and URL button.

use crate::recipient::VariableOverrides;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowKind {
    Normal,
    Csv,
    Authentication,
}

impl FlowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::Normal => "NORMAL",
            FlowKind::Csv => "CSV",
            FlowKind::Authentication => "AUTHENTICATION",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-level inputs that are not placeholder values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    /// Uploaded media id for a top-level media header.
    #[serde(default)]
    pub media_id: Option<String>,
    /// Public media URL for a top-level media header.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Media ids for carousel card headers, consumed in card order.
    #[serde(default)]
    pub card_media_ids: Vec<String>,
    /// Product retailer ids for product card headers, consumed in card order.
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Limited-time-offer expiry, epoch milliseconds.
    #[serde(default)]
    pub offer_expiration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalBroadcastRequest {
    pub template_id: String,
    pub user_id: String,
    #[serde(default)]
    pub mobiles: Vec<String>,
    #[serde(default)]
    pub variables: VariableOverrides,
    #[serde(default)]
    pub options: MessageOptions,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub mobile: String,
    #[serde(default)]
    pub variables: VariableOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvBroadcastRequest {
    pub template_id: String,
    pub user_id: String,
    #[serde(default)]
    pub rows: Vec<CsvRow>,
    /// Global overrides applied after per-row values.
    #[serde(default)]
    pub variables: VariableOverrides,
    #[serde(default)]
    pub options: MessageOptions,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationBroadcastRequest {
    pub template_id: String,
    pub user_id: String,
    #[serde(default)]
    pub mobiles: Vec<String>,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub options: MessageOptions,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

/// A broadcast request of any flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastRequest {
    Normal(NormalBroadcastRequest),
    Csv(CsvBroadcastRequest),
    Authentication(AuthenticationBroadcastRequest),
}

impl BroadcastRequest {
    /// Rebuild a request from the untagged JSON persisted next to a
    /// scheduled broadcast.
    pub fn from_persisted(flow: FlowKind, json: &str) -> serde_json::Result<Self> {
        Ok(match flow {
            FlowKind::Normal => BroadcastRequest::Normal(serde_json::from_str(json)?),
            FlowKind::Csv => BroadcastRequest::Csv(serde_json::from_str(json)?),
            FlowKind::Authentication => {
                BroadcastRequest::Authentication(serde_json::from_str(json)?)
            }
        })
    }

    /// Serialize without the flow tag, the inverse of [`Self::from_persisted`].
    pub fn to_persisted(&self) -> serde_json::Result<String> {
        match self {
            BroadcastRequest::Normal(req) => serde_json::to_string(req),
            BroadcastRequest::Csv(req) => serde_json::to_string(req),
            BroadcastRequest::Authentication(req) => serde_json::to_string(req),
        }
    }

    pub fn flow(&self) -> FlowKind {
        match self {
            BroadcastRequest::Normal(_) => FlowKind::Normal,
            BroadcastRequest::Csv(_) => FlowKind::Csv,
            BroadcastRequest::Authentication(_) => FlowKind::Authentication,
        }
    }

    pub fn template_id(&self) -> &str {
        match self {
            BroadcastRequest::Normal(req) => &req.template_id,
            BroadcastRequest::Csv(req) => &req.template_id,
            BroadcastRequest::Authentication(req) => &req.template_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            BroadcastRequest::Normal(req) => &req.user_id,
            BroadcastRequest::Csv(req) => &req.user_id,
            BroadcastRequest::Authentication(req) => &req.user_id,
        }
    }

    pub fn options(&self) -> &MessageOptions {
        match self {
            BroadcastRequest::Normal(req) => &req.options,
            BroadcastRequest::Csv(req) => &req.options,
            BroadcastRequest::Authentication(req) => &req.options,
        }
    }

    pub fn schedule_at(&self) -> Option<DateTime<Utc>> {
        match self {
            BroadcastRequest::Normal(req) => req.schedule_at,
            BroadcastRequest::Csv(req) => req.schedule_at,
            BroadcastRequest::Authentication(req) => req.schedule_at,
        }
    }

    pub fn otp(&self) -> Option<&str> {
        match self {
            BroadcastRequest::Authentication(req) => req.otp.as_deref(),
            _ => None,
        }
    }

    /// Recipient mobiles in request order.
    pub fn mobiles(&self) -> Vec<String> {
        match self {
            BroadcastRequest::Normal(req) => req.mobiles.clone(),
            BroadcastRequest::Csv(req) => req.rows.iter().map(|row| row.mobile.clone()).collect(),
            BroadcastRequest::Authentication(req) => req.mobiles.clone(),
        }
    }

    /// The override set every recipient shares.
    pub fn shared_overrides(&self) -> VariableOverrides {
        match self {
            BroadcastRequest::Normal(req) => req.variables.clone(),
            BroadcastRequest::Csv(req) => req.variables.clone(),
            BroadcastRequest::Authentication(_) => VariableOverrides::default(),
        }
    }

    /// Per-recipient overrides keyed by mobile (CSV flow only). A mobile
    /// listed twice keeps its first row.
    pub fn row_overrides(&self) -> HashMap<&str, &VariableOverrides> {
        let mut rows = HashMap::new();
        if let BroadcastRequest::Csv(req) = self {
            for row in &req.rows {
                rows.entry(row.mobile.as_str()).or_insert(&row.variables);
            }
        }
        rows
    }
}
