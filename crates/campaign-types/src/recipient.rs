//! Per-recipient value sources.

use crate::template::{SlotComponent, VariableSlot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Literal overrides for one component group, keyed by the 1-based
/// placeholder position written as a decimal string (`"1"` for `{{1}}`),
/// which is how the keys arrive in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSet {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub body: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub button: BTreeMap<String, String>,
}

impl OverrideSet {
    pub fn get(&self, component: SlotComponent, position: usize) -> Option<&str> {
        let map = match component {
            SlotComponent::Header => &self.header,
            SlotComponent::Body => &self.body,
            SlotComponent::Button => &self.button,
        };
        map.get(&position.to_string()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty() && self.button.is_empty()
    }
}

/// Override values for a whole template: top-level components plus one
/// independent set per carousel card, keyed by the card index as a decimal
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOverrides {
    #[serde(default)]
    pub template: OverrideSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cards: BTreeMap<String, OverrideSet>,
}

impl VariableOverrides {
    /// The override for `slot` at its own position. Carousel slots only see
    /// the set of their own card.
    pub fn lookup(&self, slot: &VariableSlot) -> Option<&str> {
        let set = if slot.carousel {
            self.cards.get(&slot.card_index?.to_string())?
        } else {
            &self.template
        };
        set.get(slot.component, slot.position())
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty() && self.cards.values().all(OverrideSet::is_empty)
    }
}

/// Everything known about one recipient for one build call.
#[derive(Debug, Clone)]
pub struct RecipientContext {
    pub mobile: String,
    /// Contact attributes from storage, keyed by attribute key.
    pub attributes: HashMap<String, String>,
    /// Explicit per-recipient overrides (CSV rows).
    pub overrides: Option<VariableOverrides>,
    /// The override set shared by every recipient of the broadcast.
    pub shared: Arc<VariableOverrides>,
}

impl RecipientContext {
    pub fn new(mobile: impl Into<String>, shared: Arc<VariableOverrides>) -> Self {
        Self {
            mobile: mobile.into(),
            attributes: HashMap::new(),
            overrides: None,
            shared,
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_overrides(mut self, overrides: Option<VariableOverrides>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
