use async_trait::async_trait;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::RemoteExtractionError;
use crate::models::enums::DocumentKind;

/// Canonical message for a document that is a valid shipping label.
pub const SHIPPING_LABEL_MESSAGE: &str = "N/A";

/// Postal address as printed on a label. Every field is optional and no
/// cross-field validation is done (a zip need not match its state).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "zipCode")]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.phone,
            &self.street,
            &self.city,
            &self.state,
            &self.zip,
            &self.country,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

/// Structured result produced by either extractor.
///
/// `is_shipping_label` is derived from `document_type`, so the two can never
/// disagree. It is still serialized as its own field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub document_type: DocumentKind,
    pub tracking_number: Option<String>,
    pub origin_address: Option<Address>,
    pub destination_address: Option<Address>,
    /// `"N/A"` for a valid shipping label, otherwise an explanation.
    pub message: String,
}

impl ExtractedDocument {
    pub fn is_shipping_label(&self) -> bool {
        self.document_type.is_shipping_label()
    }
}

impl Serialize for ExtractedDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExtractedDocument", 6)?;
        state.serialize_field("documentType", &self.document_type)?;
        state.serialize_field("isShippingLabel", &self.is_shipping_label())?;
        state.serialize_field("trackingNumber", &self.tracking_number)?;
        state.serialize_field("originAddress", &self.origin_address)?;
        state.serialize_field("destinationAddress", &self.destination_address)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

/// Chat-completion client abstraction (allows mocking).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one system instruction and one user turn, return the assistant's content.
    async fn complete(&self, system: &str, user: &str) -> Result<String, RemoteExtractionError>;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RemoteExtractionError> {
        (**self).complete(system, user).await
    }
}
