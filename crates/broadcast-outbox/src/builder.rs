//! Batch building of dispatch items.
//!
//! Recipients are processed in chunks of `build_batch_size`. Each message is
//! serialized as soon as it is assembled and the object form dropped, so the
//! live `ResolvedMessage` set never exceeds one chunk.

use crate::{BuildError, BuildResult, LookupError};
use async_trait::async_trait;
use campaign_config_and_utils::PipelineSettings;
use campaign_types::{BroadcastRequest, DispatchItem, RecipientContext, TemplateDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use template_payload_assembler::{FlowPolicy, PayloadAssembler};
use tracing::{debug, info, warn};

/// Attribute values per mobile, then per attribute key.
pub type AttributeMap = HashMap<String, HashMap<String, String>>;

/// Contact attribute storage.
#[async_trait]
pub trait AttributeLookup: Send + Sync {
    /// Attributes of `keys` for each of `mobiles`. Mobiles without a stored
    /// contact may be absent from the result.
    async fn lookup(
        &self,
        user_id: &str,
        mobiles: &[String],
        keys: &[String],
    ) -> Result<AttributeMap, LookupError>;
}

/// Outcome of building one broadcast.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// One item per successfully built and serialized recipient, in input order.
    pub items: Vec<DispatchItem>,
    /// Size of every build chunk, in processing order.
    pub chunk_sizes: Vec<usize>,
    /// Recipients dropped by per-recipient failures.
    pub skipped: usize,
}

/// Drives the payload assembler over a recipient list.
pub struct BatchBuilder {
    settings: PipelineSettings,
    attributes: Arc<dyn AttributeLookup>,
}

impl BatchBuilder {
    pub fn new(settings: PipelineSettings, attributes: Arc<dyn AttributeLookup>) -> Self {
        Self {
            settings,
            attributes,
        }
    }

    /// Setup checks that reject the broadcast as a whole.
    pub fn prepare(
        &self,
        template: &TemplateDefinition,
        recipients: &[String],
        request: &BroadcastRequest,
    ) -> BuildResult<()> {
        if recipients.is_empty() {
            return Err(BuildError::NoRecipients);
        }
        PayloadAssembler::validate(template, &FlowPolicy::for_request(request))?;
        Ok(())
    }

    /// Build every recipient's dispatch item.
    ///
    /// Only setup errors are returned. A recipient that fails to assemble or
    /// serialize is logged and skipped.
    pub async fn build_all(
        &self,
        recipients: &[String],
        template: &TemplateDefinition,
        request: &BroadcastRequest,
        broadcast_id: &str,
    ) -> BuildResult<BuildReport> {
        self.prepare(template, recipients, request)?;

        let policy = FlowPolicy::for_request(request);
        let keys = template.attribute_keys();
        let shared = Arc::new(request.shared_overrides());
        let rows = request.row_overrides();
        let chunk_size = self.settings.build_batch_size.max(1);

        let mut report = BuildReport {
            items: Vec::with_capacity(recipients.len()),
            ..Default::default()
        };

        for (chunk_index, chunk) in recipients.chunks(chunk_size).enumerate() {
            let attributes = self.fetch_attributes(request.user_id(), chunk, &keys).await;

            for mobile in chunk {
                let context = RecipientContext::new(mobile.as_str(), shared.clone())
                    .with_attributes(attributes.get(mobile).cloned().unwrap_or_default())
                    .with_overrides(rows.get(mobile.as_str()).map(|row| (*row).clone()));

                let message = match PayloadAssembler::assemble(template, &context, &policy) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(broadcast_id = %broadcast_id, mobile = %mobile, error = %e, "Skipping recipient");
                        report.skipped += 1;
                        continue;
                    }
                };

                match serde_json::to_string(&message) {
                    Ok(payload) => report
                        .items
                        .push(DispatchItem::new(broadcast_id, mobile.as_str(), payload)),
                    Err(e) => {
                        warn!(broadcast_id = %broadcast_id, mobile = %mobile, error = %e, "Serialization failed, skipping recipient");
                        report.skipped += 1;
                    }
                }
            }

            report.chunk_sizes.push(chunk.len());
            debug!(
                broadcast_id = %broadcast_id,
                chunk = chunk_index,
                size = chunk.len(),
                built = report.items.len(),
                "Build chunk done"
            );
        }

        info!(
            broadcast_id = %broadcast_id,
            recipients = recipients.len(),
            built = report.items.len(),
            skipped = report.skipped,
            chunks = report.chunk_sizes.len(),
            "Broadcast built"
        );
        Ok(report)
    }

    /// Attributes for one build chunk, fetched in sub-batches of
    /// `batch_size`. A failed sub-batch leaves its mobiles without attributes.
    async fn fetch_attributes(&self, user_id: &str, chunk: &[String], keys: &[String]) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        if keys.is_empty() {
            return attributes;
        }

        for batch in chunk.chunks(self.settings.batch_size.max(1)) {
            match self.attributes.lookup(user_id, batch, keys).await {
                Ok(found) => attributes.extend(found),
                Err(e) => {
                    warn!(user_id = %user_id, mobiles = batch.len(), error = %e, "Attribute lookup failed, using fallbacks");
                }
            }
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_types::{
        BodySpec, Component, MessageOptions, NormalBroadcastRequest, SlotComponent,
        TemplateCategory, VariableOverrides, VariableSlot,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AttributeLookup for CountingLookup {
        async fn lookup(
            &self,
            _user_id: &str,
            mobiles: &[String],
            _keys: &[String],
        ) -> Result<AttributeMap, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError("storage offline".into()));
            }
            Ok(mobiles
                .iter()
                .map(|m| (m.clone(), HashMap::from([("name".to_string(), format!("name-{m}"))])))
                .collect())
        }
    }

    fn lookup(fail: bool) -> Arc<CountingLookup> {
        Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn template(attribute_key: Option<&str>) -> TemplateDefinition {
        TemplateDefinition {
            id: "t-1".into(),
            name: "welcome".into(),
            category: TemplateCategory::Utility,
            language: "en".into(),
            components: vec![Component::Body(BodySpec::default())],
            variables: vec![VariableSlot {
                component: SlotComponent::Body,
                index: 0,
                carousel: false,
                card_index: None,
                attribute_key: attribute_key.map(str::to_string),
                default_value: Some("there".into()),
                example: None,
            }],
        }
    }

    fn request(mobiles: &[String]) -> BroadcastRequest {
        BroadcastRequest::Normal(NormalBroadcastRequest {
            template_id: "t-1".into(),
            user_id: "u-1".into(),
            mobiles: mobiles.to_vec(),
            variables: VariableOverrides::default(),
            options: MessageOptions::default(),
            schedule_at: None,
        })
    }

    fn mobiles(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("1555{i:07}")).collect()
    }

    fn settings(batch_size: usize, build_batch_size: usize) -> PipelineSettings {
        PipelineSettings {
            batch_size,
            build_batch_size,
            ..PipelineSettings::default()
        }
    }

    #[tokio::test]
    async fn test_empty_recipient_list_is_rejected() {
        let builder = BatchBuilder::new(PipelineSettings::default(), lookup(false));
        let result = builder.build_all(&[], &template(None), &request(&[]), "b-1").await;
        assert!(matches!(result, Err(BuildError::NoRecipients)));
    }

    #[tokio::test]
    async fn test_failing_recipient_is_skipped_within_its_chunk() {
        let builder = BatchBuilder::new(settings(200, 3), lookup(false));
        let recipients: Vec<String> = vec!["911".into(), " ".into(), "913".into(), "914".into()];

        let report = builder
            .build_all(&recipients, &template(None), &request(&recipients), "b-1")
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.chunk_sizes, vec![3, 1]);
        let built: Vec<&str> = report.items.iter().map(|item| item.mobile()).collect();
        assert_eq!(built, vec!["911", "913", "914"]);
    }

    #[tokio::test]
    async fn test_attribute_lookup_runs_in_sub_batches() {
        let attributes = lookup(false);
        let builder = BatchBuilder::new(settings(2, 5), attributes.clone());
        let recipients = mobiles(7);

        let report = builder
            .build_all(&recipients, &template(Some("name")), &request(&recipients), "b-1")
            .await
            .unwrap();

        assert_eq!(report.chunk_sizes, vec![5, 2]);
        // 5 → 2+2+1, 2 → 2
        assert_eq!(attributes.calls.load(Ordering::SeqCst), 4);
        assert!(report.items[0].payload().contains("name-15550000000"));
    }

    #[tokio::test]
    async fn test_no_lookup_without_attribute_keys() {
        let attributes = lookup(false);
        let builder = BatchBuilder::new(settings(2, 5), attributes.clone());
        let recipients = mobiles(3);

        builder
            .build_all(&recipients, &template(None), &request(&recipients), "b-1")
            .await
            .unwrap();

        assert_eq!(attributes.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back() {
        let builder = BatchBuilder::new(settings(10, 10), lookup(true));
        let recipients = mobiles(2);

        let report = builder
            .build_all(&recipients, &template(Some("name")), &request(&recipients), "b-1")
            .await
            .unwrap();

        assert_eq!(report.items.len(), 2);
        assert!(report.items[1].payload().contains(r#""text":"there""#));
        assert_eq!(report.items[1].mobile(), "15550000001");
        assert_eq!(report.items[1].broadcast_id(), "b-1");
    }
}
