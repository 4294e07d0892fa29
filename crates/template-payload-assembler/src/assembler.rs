//! Per-recipient template message assembly.
//!
//! One assembler serves every flow. The flow only decides which
//! [`ValueResolutionStrategy`] fills the placeholders and, for OTP templates,
//! which code is injected. Component handling is shared:
//!
//! - `HEADER` text: one parameter per slot, omitted when nothing resolves
//! - `HEADER` media: request media id, then request URL, then the template's
//!   example handle; omitted when none exists
//! - `BODY`: always present, blank slots become empty parameters
//! - `BUTTONS`: URL buttons take the first button slot, quick replies carry
//!   [`QUICK_REPLY_PAYLOAD`], copy-code buttons need a coupon on the request
//! - `CAROUSEL`: each card against its own slots, with media and product ids
//!   allocated in ascending card order
//! - `LIMITED_TIME_OFFER`: needs an expiration on the request

use crate::cursor::IdCursor;
use crate::error::{AssemblyError, AssemblyResult};
use crate::resolver::{strategy_for, ValueResolutionStrategy};
use campaign_types::{
    BroadcastRequest, ButtonSpec, ButtonSubType, ButtonType, ButtonsSpec, CardPayload, CardSpec,
    CarouselSpec, Component, ComponentPayload, FlowKind, HeaderFormat, HeaderSpec,
    LanguagePayload, MediaRef, MessageOptions, OfferExpiration, Parameter, ProductRef,
    RecipientContext, ResolvedMessage, SlotComponent, TemplateDefinition, TemplatePayload,
    MAX_BUTTONS_PER_CARD, MAX_CARDS,
};
use std::collections::HashSet;
use tracing::debug;

/// Payload carried by every quick-reply button.
pub const QUICK_REPLY_PAYLOAD: &str = "QUICK_REPLY";

/// Flow-specific inputs of one build: the resolution strategy (by flow), the
/// request options and the one-time code of authentication requests.
#[derive(Debug, Clone, Copy)]
pub struct FlowPolicy<'a> {
    pub flow: FlowKind,
    pub options: &'a MessageOptions,
    pub otp: Option<&'a str>,
}

impl<'a> FlowPolicy<'a> {
    pub fn new(flow: FlowKind, options: &'a MessageOptions) -> Self {
        Self {
            flow,
            options,
            otp: None,
        }
    }

    pub fn with_otp(mut self, otp: Option<&'a str>) -> Self {
        self.otp = otp;
        self
    }

    pub fn for_request(request: &'a BroadcastRequest) -> Self {
        Self::new(request.flow(), request.options()).with_otp(request.otp())
    }

    pub fn strategy(&self) -> &'static dyn ValueResolutionStrategy {
        strategy_for(self.flow)
    }

    fn otp_value(&self) -> Option<&'a str> {
        non_blank(self.otp)
    }
}

/// Builds wire-ready messages. Stateless; safe to share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadAssembler;

impl PayloadAssembler {
    /// Structural checks of a template against a request, independent of any
    /// recipient. Run once per broadcast before building.
    pub fn validate(template: &TemplateDefinition, policy: &FlowPolicy<'_>) -> AssemblyResult<()> {
        if template.is_authentication() {
            return policy
                .otp_value()
                .map(|_| ())
                .ok_or(AssemblyError::MissingField("otp"));
        }

        for component in &template.components {
            match component {
                Component::Header(header) if header.format == HeaderFormat::Product => {
                    return Err(AssemblyError::InvalidMediaType {
                        format: format_name(header.format).to_string(),
                        reason: "product headers are only allowed on carousel cards".to_string(),
                    });
                }
                Component::Carousel(carousel) => validate_carousel(carousel, policy.options)?,
                Component::LimitedTimeOffer(_) if policy.options.offer_expiration_ms.is_none() => {
                    return Err(AssemblyError::MissingField("offer_expiration_ms"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build one recipient's message.
    pub fn assemble(
        template: &TemplateDefinition,
        recipient: &RecipientContext,
        policy: &FlowPolicy<'_>,
    ) -> AssemblyResult<ResolvedMessage> {
        Self::validate(template, policy)?;
        if recipient.mobile.trim().is_empty() {
            return Err(AssemblyError::MissingField("mobile"));
        }

        let components = if template.is_authentication() {
            let otp = policy
                .otp_value()
                .ok_or(AssemblyError::MissingField("otp"))?;
            authentication_components(template, otp)
        } else {
            Assembly::new(template, recipient, policy).components()
        };

        Ok(ResolvedMessage::new(
            recipient.mobile.clone(),
            TemplatePayload {
                name: template.name.clone(),
                language: LanguagePayload {
                    code: template.language.clone(),
                },
                components,
            },
        ))
    }
}

fn validate_carousel(carousel: &CarouselSpec, options: &MessageOptions) -> AssemblyResult<()> {
    if carousel.cards.is_empty() {
        return Err(AssemblyError::CarouselConfiguration(
            "carousel has no cards".to_string(),
        ));
    }
    if carousel.cards.len() > MAX_CARDS {
        return Err(AssemblyError::CarouselConfiguration(format!(
            "carousel has {} cards, at most {MAX_CARDS} allowed",
            carousel.cards.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut needs_products = false;

    for card in &carousel.cards {
        if card.card_index >= MAX_CARDS {
            return Err(AssemblyError::CarouselConfiguration(format!(
                "card index {} out of range 0..{MAX_CARDS}",
                card.card_index
            )));
        }
        if !seen.insert(card.card_index) {
            return Err(AssemblyError::CarouselConfiguration(format!(
                "card index {} declared twice",
                card.card_index
            )));
        }
        if card.button_count() > MAX_BUTTONS_PER_CARD {
            return Err(AssemblyError::CarouselConfiguration(format!(
                "card {} has {} buttons, at most {MAX_BUTTONS_PER_CARD} allowed",
                card.card_index,
                card.button_count()
            )));
        }

        for component in &card.components {
            match component {
                Component::Carousel(_) | Component::LimitedTimeOffer(_) => {
                    return Err(AssemblyError::InvalidComponentType {
                        component: component.type_name(),
                        reason: format!("not allowed inside carousel card {}", card.card_index),
                    });
                }
                Component::Header(header) => match header.format {
                    HeaderFormat::Image | HeaderFormat::Video => {}
                    HeaderFormat::Product => needs_products = true,
                    HeaderFormat::Text | HeaderFormat::Location | HeaderFormat::Document => {
                        return Err(AssemblyError::InvalidMediaType {
                            format: format_name(header.format).to_string(),
                            reason: format!(
                                "card {} header must be IMAGE, VIDEO or PRODUCT",
                                card.card_index
                            ),
                        });
                    }
                },
                Component::Body(_) | Component::Buttons(_) => {}
            }
        }
    }

    if needs_products && options.product_ids.iter().all(|id| id.trim().is_empty()) {
        return Err(AssemblyError::MissingField("product_ids"));
    }
    Ok(())
}

/// OTP templates skip resolution: the code goes into the body and into every
/// OTP/URL button.
fn authentication_components(template: &TemplateDefinition, otp: &str) -> Vec<ComponentPayload> {
    let mut components = Vec::new();
    for component in &template.components {
        match component {
            Component::Body(_) => components.push(ComponentPayload::Body {
                parameters: vec![Parameter::text(otp)],
            }),
            Component::Buttons(spec) => {
                components.extend(
                    spec.buttons
                        .iter()
                        .filter(|b| matches!(b.button_type, ButtonType::Otp | ButtonType::Url))
                        .map(|b| ComponentPayload::Button {
                            sub_type: ButtonSubType::Url,
                            index: b.index.to_string(),
                            parameters: vec![Parameter::text(otp)],
                        }),
                );
            }
            _ => {}
        }
    }
    components
}

/// Assembly state for one recipient. The cursors start at the head of the
/// request lists on every build.
struct Assembly<'a> {
    template: &'a TemplateDefinition,
    recipient: &'a RecipientContext,
    options: &'a MessageOptions,
    strategy: &'static dyn ValueResolutionStrategy,
    media_ids: IdCursor<'a>,
    product_ids: IdCursor<'a>,
}

impl<'a> Assembly<'a> {
    fn new(
        template: &'a TemplateDefinition,
        recipient: &'a RecipientContext,
        policy: &FlowPolicy<'a>,
    ) -> Self {
        Self {
            template,
            recipient,
            options: policy.options,
            strategy: policy.strategy(),
            media_ids: IdCursor::new(&policy.options.card_media_ids),
            product_ids: IdCursor::new(&policy.options.product_ids),
        }
    }

    fn components(mut self) -> Vec<ComponentPayload> {
        let template = self.template;
        let mut components = Vec::with_capacity(template.components.len());

        for component in &template.components {
            match component {
                Component::Header(header) => components.extend(self.header(header, None)),
                Component::Body(_) => components.push(self.body(None)),
                Component::Buttons(buttons) => components.extend(self.buttons(buttons, None)),
                Component::Carousel(carousel) => components.push(self.carousel(carousel)),
                Component::LimitedTimeOffer(_) => components.extend(self.limited_time_offer()),
            }
        }
        components
    }

    fn resolve_all(&self, component: SlotComponent, card: Option<usize>) -> Vec<String> {
        self.template
            .slots_for(component, card)
            .into_iter()
            .map(|slot| self.strategy.resolve(slot, self.recipient))
            .collect()
    }

    fn header(&mut self, spec: &HeaderSpec, card: Option<usize>) -> Option<ComponentPayload> {
        let parameters = match spec.format {
            HeaderFormat::Text => {
                let values = self.resolve_all(SlotComponent::Header, card);
                if values.iter().all(|value| value.trim().is_empty()) {
                    return None;
                }
                values.into_iter().map(Parameter::text).collect()
            }
            HeaderFormat::Image | HeaderFormat::Video | HeaderFormat::Document => {
                let media = match card {
                    None => self.top_level_media(spec),
                    Some(card_index) => self.card_media(spec, card_index),
                }?;
                vec![media_parameter(spec.format, media)?]
            }
            HeaderFormat::Product => {
                let id = non_blank(self.product_ids.next())?;
                vec![Parameter::Product {
                    product: ProductRef {
                        product_retailer_id: id.to_string(),
                        catalog_id: self.options.catalog_id.clone(),
                    },
                }]
            }
            HeaderFormat::Location => return None,
        };
        Some(ComponentPayload::Header { parameters })
    }

    fn top_level_media(&self, spec: &HeaderSpec) -> Option<MediaRef> {
        non_blank(self.options.media_id.as_deref())
            .map(MediaRef::id)
            .or_else(|| non_blank(self.options.media_url.as_deref()).map(MediaRef::link))
            .or_else(|| non_blank(spec.example_handle.as_deref()).map(MediaRef::link))
    }

    fn card_media(&mut self, spec: &HeaderSpec, card_index: usize) -> Option<MediaRef> {
        if let Some(id) = non_blank(self.media_ids.next()) {
            return Some(MediaRef::id(id));
        }
        debug!(card_index, "No card media id left, using template example");
        non_blank(spec.example_handle.as_deref()).map(MediaRef::link)
    }

    fn body(&self, card: Option<usize>) -> ComponentPayload {
        ComponentPayload::Body {
            parameters: self
                .resolve_all(SlotComponent::Body, card)
                .into_iter()
                .map(Parameter::text)
                .collect(),
        }
    }

    fn buttons(&self, spec: &ButtonsSpec, card: Option<usize>) -> Vec<ComponentPayload> {
        let url_value = self
            .template
            .slots_for(SlotComponent::Button, card)
            .first()
            .map(|slot| self.strategy.resolve(slot, self.recipient));
        let coupon = non_blank(self.options.coupon_code.as_deref());

        spec.buttons
            .iter()
            .filter_map(|button| match button.button_type {
                ButtonType::Url => url_value
                    .as_ref()
                    .map(|value| button_payload(button, ButtonSubType::Url, Parameter::text(value.as_str()))),
                ButtonType::QuickReply => Some(button_payload(
                    button,
                    ButtonSubType::QuickReply,
                    Parameter::Payload {
                        payload: QUICK_REPLY_PAYLOAD.to_string(),
                    },
                )),
                ButtonType::CopyCode => coupon.map(|code| {
                    button_payload(
                        button,
                        ButtonSubType::CopyCode,
                        Parameter::CouponCode {
                            coupon_code: code.to_string(),
                        },
                    )
                }),
                ButtonType::PhoneNumber | ButtonType::Otp => None,
            })
            .collect()
    }

    fn carousel(&mut self, spec: &'a CarouselSpec) -> ComponentPayload {
        let mut cards: Vec<&'a CardSpec> = spec.cards.iter().collect();
        cards.sort_by_key(|card| card.card_index);

        let mut payloads = Vec::with_capacity(cards.len());
        for card in cards {
            payloads.push(CardPayload {
                card_index: card.card_index,
                components: self.card_components(card),
            });
        }
        ComponentPayload::Carousel { cards: payloads }
    }

    fn card_components(&mut self, card: &'a CardSpec) -> Vec<ComponentPayload> {
        let scope = Some(card.card_index);
        let mut components = Vec::with_capacity(card.components.len());
        for component in &card.components {
            match component {
                Component::Header(header) => components.extend(self.header(header, scope)),
                Component::Body(_) => components.push(self.body(scope)),
                Component::Buttons(buttons) => components.extend(self.buttons(buttons, scope)),
                // Rejected by validation.
                Component::Carousel(_) | Component::LimitedTimeOffer(_) => {}
            }
        }
        components
    }

    fn limited_time_offer(&self) -> Option<ComponentPayload> {
        let expiration_time_ms = self.options.offer_expiration_ms?;
        Some(ComponentPayload::LimitedTimeOffer {
            parameters: vec![Parameter::LimitedTimeOffer {
                limited_time_offer: OfferExpiration { expiration_time_ms },
            }],
        })
    }
}

fn button_payload(button: &ButtonSpec, sub_type: ButtonSubType, parameter: Parameter) -> ComponentPayload {
    ComponentPayload::Button {
        sub_type,
        index: button.index.to_string(),
        parameters: vec![parameter],
    }
}

fn media_parameter(format: HeaderFormat, media: MediaRef) -> Option<Parameter> {
    match format {
        HeaderFormat::Image => Some(Parameter::Image { image: media }),
        HeaderFormat::Video => Some(Parameter::Video { video: media }),
        HeaderFormat::Document => Some(Parameter::Document { document: media }),
        HeaderFormat::Text | HeaderFormat::Location | HeaderFormat::Product => None,
    }
}

fn format_name(format: HeaderFormat) -> &'static str {
    match format {
        HeaderFormat::Text => "TEXT",
        HeaderFormat::Image => "IMAGE",
        HeaderFormat::Video => "VIDEO",
        HeaderFormat::Document => "DOCUMENT",
        HeaderFormat::Location => "LOCATION",
        HeaderFormat::Product => "PRODUCT",
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
