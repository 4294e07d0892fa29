//! End-to-end build and dispatch through `BroadcastPipeline` with in-memory
//! collaborators.

use async_trait::async_trait;
use broadcast_outbox::{
    AttributeLookup, AttributeMap, BatchBuilder, BroadcastPipeline, BuildError, ChannelClient,
    ChannelError, ChannelResult, LookupError, SendOutcome,
};
use campaign_config_and_utils::PipelineSettings;
use campaign_types::{
    AccountInfo, BodySpec, CarouselSpec, CardSpec, Component, CsvBroadcastRequest, CsvRow,
    DispatchItem, MessageOptions, NormalBroadcastRequest, BroadcastRequest, SlotComponent,
    TemplateCategory, TemplateDefinition, VariableOverrides, VariableSlot, MAX_CARDS,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Attribute store backed by a fixed map.
struct MockAttributes {
    values: AttributeMap,
    calls: Mutex<Vec<usize>>,
}

impl MockAttributes {
    fn empty() -> Arc<Self> {
        Self::with(AttributeMap::new())
    }

    fn with(values: AttributeMap) -> Arc<Self> {
        Arc::new(Self {
            values,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AttributeLookup for MockAttributes {
    async fn lookup(
        &self,
        _user_id: &str,
        mobiles: &[String],
        _keys: &[String],
    ) -> Result<AttributeMap, LookupError> {
        self.calls.lock().await.push(mobiles.len());
        Ok(mobiles
            .iter()
            .filter_map(|m| self.values.get(m).map(|v| (m.clone(), v.clone())))
            .collect())
    }
}

/// Channel that records chunk sizes and throws for chunks starting at
/// `throw_at`.
struct RecordingChannel {
    chunks: Mutex<Vec<Vec<String>>>,
    throw_at: Option<String>,
}

impl RecordingChannel {
    fn new(throw_at: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            throw_at: throw_at.map(str::to_string),
        })
    }
}

#[async_trait]
impl ChannelClient for RecordingChannel {
    async fn send(&self, chunk: &[DispatchItem], _account: &AccountInfo) -> ChannelResult<SendOutcome> {
        let mobiles: Vec<String> = chunk.iter().map(|i| i.mobile().to_string()).collect();
        let first = mobiles.first().cloned();
        self.chunks.lock().await.push(mobiles);

        if first.is_some() && first == self.throw_at {
            return Err(ChannelError::Rejected {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(SendOutcome::accepted(chunk.len()))
    }
}

fn account() -> AccountInfo {
    AccountInfo {
        user_id: "u-1".into(),
        phone_number_id: "pn-1".into(),
        business_account_id: Some("waba-1".into()),
        access_token: "token".into(),
    }
}

fn body_slot(attribute_key: Option<&str>) -> VariableSlot {
    VariableSlot {
        component: SlotComponent::Body,
        index: 0,
        carousel: false,
        card_index: None,
        attribute_key: attribute_key.map(str::to_string),
        default_value: Some("customer".into()),
        example: None,
    }
}

fn template(variables: Vec<VariableSlot>) -> TemplateDefinition {
    TemplateDefinition {
        id: "t-1".into(),
        name: "order_update".into(),
        category: TemplateCategory::Marketing,
        language: "en".into(),
        components: vec![Component::Body(BodySpec {
            text: Some("Hello {{1}}".into()),
        })],
        variables,
    }
}

fn normal_request(mobiles: &[String], shared_body: Option<&str>) -> BroadcastRequest {
    let mut variables = VariableOverrides::default();
    if let Some(value) = shared_body {
        variables.template.body.insert("1".into(), value.into());
    }
    BroadcastRequest::Normal(NormalBroadcastRequest {
        template_id: "t-1".into(),
        user_id: "u-1".into(),
        mobiles: mobiles.to_vec(),
        variables,
        options: MessageOptions::default(),
        schedule_at: None,
    })
}

fn mobiles(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("91{i:08}")).collect()
}

fn settings() -> PipelineSettings {
    PipelineSettings::default()
}

#[tokio::test]
async fn test_build_chunks_are_bounded() {
    let builder = BatchBuilder::new(settings(), MockAttributes::empty());
    let recipients = mobiles(10_050);

    let report = builder
        .build_all(&recipients, &template(vec![body_slot(None)]), &normal_request(&recipients, None), "b-1")
        .await
        .unwrap();

    assert_eq!(report.chunk_sizes.len(), 21);
    assert_eq!(report.chunk_sizes.last(), Some(&50));
    assert!(report.chunk_sizes[..20].iter().all(|size| *size == 500));
    assert_eq!(report.items.len(), 10_050);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.items[10_049].mobile(), "9100010049");
}

#[tokio::test]
async fn test_attribute_lookups_follow_batch_size() {
    let attributes = MockAttributes::empty();
    let builder = BatchBuilder::new(settings(), attributes.clone());
    let recipients = mobiles(1_050);

    builder
        .build_all(
            &recipients,
            &template(vec![body_slot(Some("first_name"))]),
            &normal_request(&recipients, None),
            "b-1",
        )
        .await
        .unwrap();

    // Build chunks 500, 500, 50; lookup sub-batches of 200.
    let calls = attributes.calls.lock().await.clone();
    assert_eq!(calls, vec![200, 200, 100, 200, 200, 100, 50]);
}

#[tokio::test]
async fn test_failing_chunk_leaves_siblings_untouched() {
    let channel = RecordingChannel::new(Some("9100000100"));
    let pipeline = BroadcastPipeline::new(settings(), MockAttributes::empty(), channel.clone());
    let recipients = mobiles(250);

    let handle = pipeline
        .submit(
            &template(vec![body_slot(None)]),
            &recipients,
            &normal_request(&recipients, None),
            "b-1",
            account(),
            None,
        )
        .await
        .unwrap();
    let summary = handle.wait().await;

    assert_eq!(summary.chunks, 3);
    assert!(summary.failed >= 100);
    assert_eq!(summary.dispatched, 150);
    assert_eq!(summary.failed_chunks, 1);

    let mut sizes: Vec<usize> = channel.chunks.lock().await.iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
}

#[tokio::test]
async fn test_completion_callback_fires_once() {
    let pipeline = BroadcastPipeline::new(settings(), MockAttributes::empty(), RecordingChannel::new(None));
    let recipients = mobiles(5);
    let (tx, rx) = oneshot::channel();

    pipeline
        .submit(
            &template(vec![body_slot(None)]),
            &recipients,
            &normal_request(&recipients, None),
            "b-9",
            account(),
            Some(Box::new(move |summary| {
                let _ = tx.send(summary);
            })),
        )
        .await
        .unwrap();

    let summary = rx.await.unwrap();
    assert_eq!(summary.broadcast_id, "b-9");
    assert_eq!(summary.dispatched, 5);
}

#[tokio::test]
async fn test_setup_errors_surface_before_dispatch() {
    let channel = RecordingChannel::new(None);
    let pipeline = BroadcastPipeline::new(settings(), MockAttributes::empty(), channel.clone());
    let recipients = mobiles(3);

    let mut broken = template(vec![]);
    broken.components.push(Component::Carousel(CarouselSpec {
        cards: (0..=MAX_CARDS)
            .map(|i| CardSpec {
                card_index: i,
                components: vec![Component::Body(BodySpec::default())],
            })
            .collect(),
    }));

    let result = pipeline
        .submit(&broken, &recipients, &normal_request(&recipients, None), "b-1", account(), None)
        .await;
    assert!(matches!(result, Err(BuildError::Template(_))));

    let result = pipeline
        .submit(&template(vec![]), &[], &normal_request(&[], None), "b-1", account(), None)
        .await;
    assert!(matches!(result, Err(BuildError::NoRecipients)));

    assert!(channel.chunks.lock().await.is_empty());
}

#[tokio::test]
async fn test_flow_precedence_end_to_end() {
    let recipients = vec!["911".to_string()];
    let attributes = MockAttributes::with(HashMap::from([(
        "911".to_string(),
        HashMap::from([("first_name".to_string(), "Asha".to_string())]),
    )]));
    let builder = BatchBuilder::new(settings(), attributes);
    let t = template(vec![body_slot(Some("first_name"))]);

    let normal = builder
        .build_all(&recipients, &t, &normal_request(&recipients, Some("Shared")), "b-1")
        .await
        .unwrap();
    assert!(normal.items[0].payload().contains(r#""text":"Shared""#));

    let mut row = VariableOverrides::default();
    row.template.body.insert("1".into(), "Row".into());
    let csv = BroadcastRequest::Csv(CsvBroadcastRequest {
        template_id: "t-1".into(),
        user_id: "u-1".into(),
        rows: vec![CsvRow {
            mobile: "911".into(),
            variables: row,
        }],
        variables: VariableOverrides::default(),
        options: MessageOptions::default(),
        schedule_at: None,
    });
    let csv = builder.build_all(&recipients, &t, &csv, "b-2").await.unwrap();
    assert!(csv.items[0].payload().contains(r#""text":"Asha""#));
}

#[tokio::test]
async fn test_rebuild_is_byte_identical() {
    let builder = BatchBuilder::new(settings(), MockAttributes::empty());
    let recipients = mobiles(3);
    let t = template(vec![body_slot(None)]);
    let request = normal_request(&recipients, Some("Ravi"));

    let first = builder.build_all(&recipients, &t, &request, "b-1").await.unwrap();
    let second = builder.build_all(&recipients, &t, &request, "b-1").await.unwrap();

    assert_eq!(first.items, second.items);
}
