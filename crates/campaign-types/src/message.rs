//! Wire-ready template messages.
//!
//! The shape follows the channel's template message API:
//!
//! ```json
//! {"messaging_product": "whatsapp", "recipient_type": "individual", "to": "15551234567",
//!  "type": "template",
//!  "template": {"name": "promo", "language": {"code": "en"}, "components": [
//!     {"type": "body", "parameters": [{"type": "text", "text": "Ann"}]}]}}
//! ```
//!
//! Every collection is a `Vec` in template order, so serializing the same
//! message twice yields the same bytes.

use serde::{Deserialize, Serialize};

pub const MESSAGING_PRODUCT: &str = "whatsapp";
pub const RECIPIENT_TYPE: &str = "individual";
pub const MESSAGE_TYPE: &str = "template";

/// One recipient's fully materialized message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMessage {
    pub messaging_product: String,
    pub recipient_type: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub template: TemplatePayload,
}

impl ResolvedMessage {
    pub fn new(to: impl Into<String>, template: TemplatePayload) -> Self {
        Self {
            messaging_product: MESSAGING_PRODUCT.to_string(),
            recipient_type: RECIPIENT_TYPE.to_string(),
            to: to.into(),
            message_type: MESSAGE_TYPE.to_string(),
            template,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
    pub name: String,
    pub language: LanguagePayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePayload {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentPayload {
    Header {
        parameters: Vec<Parameter>,
    },
    Body {
        parameters: Vec<Parameter>,
    },
    Button {
        sub_type: ButtonSubType,
        /// Button position, a string on the wire.
        index: String,
        parameters: Vec<Parameter>,
    },
    Carousel {
        cards: Vec<CardPayload>,
    },
    LimitedTimeOffer {
        parameters: Vec<Parameter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonSubType {
    Url,
    QuickReply,
    CopyCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPayload {
    pub card_index: usize,
    pub components: Vec<ComponentPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    Text { text: String },
    Payload { payload: String },
    Image { image: MediaRef },
    Video { video: MediaRef },
    Document { document: MediaRef },
    Product { product: ProductRef },
    CouponCode { coupon_code: String },
    LimitedTimeOffer { limited_time_offer: OfferExpiration },
}

impl Parameter {
    pub fn text(value: impl Into<String>) -> Self {
        Parameter::Text { text: value.into() }
    }
}

/// Either an uploaded media id or a public link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl MediaRef {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            link: None,
        }
    }

    pub fn link(link: impl Into<String>) -> Self {
        Self {
            id: None,
            link: Some(link.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_retailer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferExpiration {
    pub expiration_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_to_channel_shape() {
        let message = ResolvedMessage::new(
            "15551234567",
            TemplatePayload {
                name: "promo".into(),
                language: LanguagePayload { code: "en".into() },
                components: vec![
                    ComponentPayload::Body {
                        parameters: vec![Parameter::text("Ann")],
                    },
                    ComponentPayload::Button {
                        sub_type: ButtonSubType::QuickReply,
                        index: "0".into(),
                        parameters: vec![Parameter::Payload {
                            payload: "QUICK_REPLY".into(),
                        }],
                    },
                ],
            },
        );

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "template");
        assert_eq!(value["template"]["language"]["code"], "en");
        assert_eq!(value["template"]["components"][0]["type"], "body");
        assert_eq!(value["template"]["components"][0]["parameters"][0]["text"], "Ann");
        assert_eq!(value["template"]["components"][1]["sub_type"], "quick_reply");
    }

    #[test]
    fn media_ref_omits_absent_fields() {
        let json = serde_json::to_string(&Parameter::Image {
            image: MediaRef::id("123"),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"image","image":{"id":"123"}}"#);
    }
}
