//! Placeholder value resolution.
//!
//! A strategy walks an ordered list of value sources for one slot and returns
//! the first non-blank value. Resolution never fails: when nothing yields a
//! value the result is the empty string.
//!
//! | Priority | Normal flow        | CSV flow               |
//! |----------|--------------------|------------------------|
//! | 1        | shared override    | contact attribute      |
//! | 2        | contact attribute  | per-recipient override |
//! | 3        | fallback           | shared override        |
//! | 4        |                    | fallback               |

use campaign_types::{FlowKind, RecipientContext, VariableSlot};

/// Resolves one placeholder for one recipient.
pub trait ValueResolutionStrategy: Send + Sync {
    fn resolve(&self, slot: &VariableSlot, recipient: &RecipientContext) -> String;
}

/// One override set shared by the whole broadcast outranks contact data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalFlowResolver;

impl ValueResolutionStrategy for NormalFlowResolver {
    fn resolve(&self, slot: &VariableSlot, recipient: &RecipientContext) -> String {
        first_non_blank([
            recipient.shared.lookup(slot),
            attribute(slot, recipient),
            slot.fallback(),
        ])
    }
}

/// Contact data outranks the uploaded row, which outranks the global set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFlowResolver;

impl ValueResolutionStrategy for CsvFlowResolver {
    fn resolve(&self, slot: &VariableSlot, recipient: &RecipientContext) -> String {
        first_non_blank([
            attribute(slot, recipient),
            recipient
                .overrides
                .as_ref()
                .and_then(|overrides| overrides.lookup(slot)),
            recipient.shared.lookup(slot),
            slot.fallback(),
        ])
    }
}

static NORMAL: NormalFlowResolver = NormalFlowResolver;
static CSV: CsvFlowResolver = CsvFlowResolver;

/// The resolution strategy of a flow. Authentication requests resolve like
/// the normal flow when their template is not an OTP template.
pub fn strategy_for(flow: FlowKind) -> &'static dyn ValueResolutionStrategy {
    match flow {
        FlowKind::Csv => &CSV,
        FlowKind::Normal | FlowKind::Authentication => &NORMAL,
    }
}

fn attribute<'a>(slot: &VariableSlot, recipient: &'a RecipientContext) -> Option<&'a str> {
    let key = slot.attribute_key.as_deref()?.trim();
    if key.is_empty() {
        return None;
    }
    recipient.attribute(key)
}

fn first_non_blank<'a, const N: usize>(sources: [Option<&'a str>; N]) -> String {
    sources
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}
