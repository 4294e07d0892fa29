//! Channel client for chunked message delivery.

use crate::{ChannelError, ChannelResult};
use async_trait::async_trait;
use campaign_config_and_utils::ChannelSettings;
use campaign_types::{AccountInfo, DispatchItem};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::debug;

/// What the channel reports for one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOutcome {
    /// Whether the channel accepted the chunk at all.
    pub success: bool,
    pub dispatched: usize,
    pub failed: usize,
}

impl SendOutcome {
    /// Every message of a chunk of `size` accepted.
    pub fn accepted(size: usize) -> Self {
        Self {
            success: true,
            dispatched: size,
            failed: 0,
        }
    }
}

/// Sends one dispatch chunk on behalf of a business account.
///
/// Implementations own transport concerns such as timeouts. The coordinator
/// does not retry.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn send(&self, chunk: &[DispatchItem], account: &AccountInfo) -> ChannelResult<SendOutcome>;
}

/// Request body of one chunk. Message payloads are embedded verbatim.
#[derive(Debug, Serialize)]
struct SendChunkRequest<'a> {
    broadcast_id: &'a str,
    messages: Vec<&'a RawValue>,
}

/// Response from the channel's bulk endpoint.
#[derive(Debug, Deserialize)]
struct SendChunkResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    dispatched: usize,
    #[serde(default)]
    failed: usize,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// HTTP client posting each chunk to `{api_url}/{phone_number_id}/messages/bulk`.
pub struct HttpChannelClient {
    api_url: String,
    client: Client,
}

impl HttpChannelClient {
    /// Create a new channel client.
    pub fn new(settings: &ChannelSettings) -> ChannelResult<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, account: &AccountInfo) -> String {
        format!("{}/{}/messages/bulk", self.api_url, account.phone_number_id)
    }
}

fn chunk_request(chunk: &[DispatchItem]) -> ChannelResult<SendChunkRequest<'_>> {
    let broadcast_id = chunk.first().map(DispatchItem::broadcast_id).unwrap_or_default();
    let messages = chunk
        .iter()
        .map(|item| serde_json::from_str::<&RawValue>(item.payload()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SendChunkRequest {
        broadcast_id,
        messages,
    })
}

#[async_trait]
impl ChannelClient for HttpChannelClient {
    async fn send(&self, chunk: &[DispatchItem], account: &AccountInfo) -> ChannelResult<SendOutcome> {
        let url = self.endpoint(account);
        let request = chunk_request(chunk)?;

        debug!(
            url = %url,
            broadcast_id = %request.broadcast_id,
            messages = chunk.len(),
            "Sending chunk"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", account.access_token))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let result: SendChunkResponse = response.json().await?;
        if let Some(error) = result.error.as_deref() {
            debug!(error = %error, "Channel reported chunk error");
        }

        Ok(SendOutcome {
            success: result.success,
            dispatched: result.dispatched,
            failed: result.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(mobile: &str, payload: &str) -> DispatchItem {
        DispatchItem::new("b-1", mobile, payload)
    }

    #[test]
    fn test_chunk_request_embeds_payloads_verbatim() {
        let chunk = vec![
            item("1", r#"{"to":"1","type":"template"}"#),
            item("2", r#"{"to":"2","type":"template"}"#),
        ];

        let request = chunk_request(&chunk).unwrap();
        let json = serde_json::to_string(&request).unwrap();

        assert_eq!(
            json,
            r#"{"broadcast_id":"b-1","messages":[{"to":"1","type":"template"},{"to":"2","type":"template"}]}"#
        );
    }

    #[test]
    fn test_chunk_request_rejects_corrupt_payload() {
        let chunk = vec![item("1", "{not json")];
        assert!(matches!(chunk_request(&chunk), Err(ChannelError::Json(_))));
    }

    #[test]
    fn test_endpoint_uses_phone_number_id() {
        let settings = ChannelSettings {
            api_url: "https://graph.example.com/v21.0/".to_string(),
            timeout_secs: 5,
        };
        let client = HttpChannelClient::new(&settings).unwrap();
        let account = AccountInfo {
            user_id: "u-1".into(),
            phone_number_id: "pn-9".into(),
            business_account_id: None,
            access_token: "token".into(),
        };

        assert_eq!(
            client.endpoint(&account),
            "https://graph.example.com/v21.0/pn-9/messages/bulk"
        );
    }

    #[test]
    fn test_response_defaults() {
        let response: SendChunkResponse =
            serde_json::from_str(r#"{"dispatched": 3, "failed": 1}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.dispatched, 3);
        assert_eq!(response.failed, 1);
        assert!(response.error.is_none());
    }

    #[test]
    fn test_accepted_outcome() {
        assert_eq!(
            SendOutcome::accepted(4),
            SendOutcome {
                success: true,
                dispatched: 4,
                failed: 0
            }
        );
    }
}
