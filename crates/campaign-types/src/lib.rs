//! Shared data model for the campaign build-and-dispatch pipeline.
//!
//! - [`template`]: read-only template definitions (components, slots, cards)
//! - [`recipient`]: per-recipient value sources and override sets
//! - [`request`]: flow-specific broadcast requests as submitted or persisted
//! - [`message`]: the wire-ready template message the channel receives
//! - [`dispatch`]: serialized dispatch items, account credentials, summaries
//! - [`schedule`]: deferred broadcast handles and their lifecycle status

pub mod dispatch;
pub mod message;
pub mod recipient;
pub mod request;
pub mod schedule;
pub mod template;

pub use dispatch::{AccountInfo, DispatchItem, DispatchSummary};
pub use message::{
    ButtonSubType, CardPayload, ComponentPayload, LanguagePayload, MediaRef, OfferExpiration,
    Parameter, ProductRef, ResolvedMessage, TemplatePayload,
};
pub use recipient::{OverrideSet, RecipientContext, VariableOverrides};
pub use request::{
    AuthenticationBroadcastRequest, BroadcastRequest, CsvBroadcastRequest, CsvRow, FlowKind,
    MessageOptions, NormalBroadcastRequest,
};
pub use schedule::{BroadcastStatus, ScheduledBroadcastHandle};
pub use template::{
    BodySpec, ButtonSpec, ButtonType, ButtonsSpec, CardSpec, CarouselSpec, Component,
    HeaderFormat, HeaderSpec, LimitedTimeOfferSpec, SlotComponent, TemplateCategory,
    TemplateDefinition, VariableSlot, MAX_BUTTONS_PER_CARD, MAX_CARDS,
};
