//! Template definitions.
//!
//! A [`TemplateDefinition`] is loaded once per broadcast and shared read-only
//! by every recipient build. Components keep their template order; variable
//! slots are kept in one flat list and addressed by component, card and
//! 0-based slot index (slot `n` is the wire placeholder `{{n+1}}`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum number of cards in one carousel.
pub const MAX_CARDS: usize = 10;

/// Maximum number of buttons on one carousel card.
pub const MAX_BUTTONS_PER_CARD: usize = 2;

/// Template category as approved by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateCategory {
    Authentication,
    Marketing,
    Utility,
}

/// A message template and its placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    pub category: TemplateCategory,
    pub language: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub variables: Vec<VariableSlot>,
}

impl TemplateDefinition {
    /// Slots of one component, in placeholder order.
    ///
    /// `card_index: None` selects top-level slots only; `Some(i)` selects the
    /// carousel slots of card `i` only.
    pub fn slots_for(
        &self,
        component: SlotComponent,
        card_index: Option<usize>,
    ) -> Vec<&VariableSlot> {
        let mut slots: Vec<&VariableSlot> = self
            .variables
            .iter()
            .filter(|slot| slot.component == component)
            .filter(|slot| match card_index {
                None => !slot.carousel,
                Some(card) => slot.carousel && slot.card_index == Some(card),
            })
            .collect();
        slots.sort_by_key(|slot| slot.index);
        slots
    }

    /// Distinct contact attribute keys referenced by any slot.
    pub fn attribute_keys(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter_map(|slot| slot.attribute_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether this is an authentication (OTP) template.
    pub fn is_authentication(&self) -> bool {
        self.category == TemplateCategory::Authentication
    }
}

/// One template component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Component {
    Header(HeaderSpec),
    Body(BodySpec),
    Buttons(ButtonsSpec),
    Carousel(CarouselSpec),
    LimitedTimeOffer(LimitedTimeOfferSpec),
}

impl Component {
    /// Upper-case type name, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Component::Header(_) => "HEADER",
            Component::Body(_) => "BODY",
            Component::Buttons(_) => "BUTTONS",
            Component::Carousel(_) => "CAROUSEL",
            Component::LimitedTimeOffer(_) => "LIMITED_TIME_OFFER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderFormat {
    Text,
    Image,
    Video,
    Document,
    Location,
    Product,
}

impl HeaderFormat {
    /// Image, video and document headers carry a media reference.
    pub fn is_media(self) -> bool {
        matches!(
            self,
            HeaderFormat::Image | HeaderFormat::Video | HeaderFormat::Document
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub format: HeaderFormat,
    #[serde(default)]
    pub text: Option<String>,
    /// Media handle or URL submitted with the template for review.
    #[serde(default)]
    pub example_handle: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonType {
    Url,
    QuickReply,
    PhoneNumber,
    Otp,
    CopyCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub button_type: ButtonType,
    pub index: usize,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonsSpec {
    #[serde(default)]
    pub buttons: Vec<ButtonSpec>,
}

impl ButtonsSpec {
    pub fn declares(&self, button_type: ButtonType) -> bool {
        self.buttons.iter().any(|b| b.button_type == button_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarouselSpec {
    #[serde(default)]
    pub cards: Vec<CardSpec>,
}

/// One swipeable carousel card. Its slots live in
/// [`TemplateDefinition::variables`] with `carousel = true` and a matching
/// `card_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    pub card_index: usize,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl CardSpec {
    pub fn header(&self) -> Option<&HeaderSpec> {
        self.components.iter().find_map(|c| match c {
            Component::Header(header) => Some(header),
            _ => None,
        })
    }

    pub fn button_count(&self) -> usize {
        self.components
            .iter()
            .map(|c| match c {
                Component::Buttons(spec) => spec.buttons.len(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitedTimeOfferSpec {
    #[serde(default)]
    pub text: Option<String>,
}

/// Component a placeholder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotComponent {
    Header,
    Body,
    Button,
}

/// One placeholder of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSlot {
    pub component: SlotComponent,
    /// 0-based; maps to wire placeholder `{{index + 1}}`.
    pub index: usize,
    #[serde(default)]
    pub carousel: bool,
    #[serde(default)]
    pub card_index: Option<usize>,
    /// Contact attribute that personalizes this slot.
    #[serde(default)]
    pub attribute_key: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
}

impl VariableSlot {
    /// 1-based position used by override maps and wire placeholders.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    /// Last-resort literal: the default value, else the review example.
    pub fn fallback(&self) -> Option<&str> {
        [self.default_value.as_deref(), self.example.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
    }
}
