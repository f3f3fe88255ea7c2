use serde::Deserialize;
use serde_json::Value;

use super::types::{Address, ExtractedDocument, SHIPPING_LABEL_MESSAGE};
use super::RemoteExtractionError;
use crate::models::enums::DocumentKind;

/// Message used when the model classified the document but left `message` null.
pub const DEFAULT_PROCESSED_MESSAGE: &str = "Document processed successfully";

/// Parse the model's reply into an `ExtractedDocument`.
///
/// The reply must be a single JSON object, optionally wrapped in one fenced
/// code block. Fields may be null or missing; missing is read as null.
pub fn parse_extraction_response(response: &str) -> Result<ExtractedDocument, RemoteExtractionError> {
    let json_str = extract_json_object(response)?;
    let raw: RawExtraction = serde_json::from_str(json_str)
        .map_err(|e| RemoteExtractionError::JsonParsing(e.to_string()))?;
    normalize(raw)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    is_shipping_label: Option<bool>,
    #[serde(default)]
    tracking_number: Option<Value>,
    #[serde(default)]
    origin_address: Option<Value>,
    #[serde(default)]
    destination_address: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Locate the JSON object: either the whole reply or the body of one fenced block.
fn extract_json_object(response: &str) -> Result<&str, RemoteExtractionError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(RemoteExtractionError::MalformedResponse("Empty response".into()));
    }

    let body = if let Some(fenced) = trimmed.strip_prefix("```") {
        let after_tag = fenced
            .strip_prefix("json")
            .or_else(|| fenced.strip_prefix("JSON"))
            .unwrap_or(fenced);
        after_tag
            .strip_suffix("```")
            .ok_or_else(|| RemoteExtractionError::MalformedResponse("Unclosed code block".into()))?
            .trim()
    } else {
        trimmed
    };

    if !(body.starts_with('{') && body.ends_with('}')) {
        return Err(RemoteExtractionError::MalformedResponse(
            "Expected a single JSON object".into(),
        ));
    }
    Ok(body)
}

fn normalize(raw: RawExtraction) -> Result<ExtractedDocument, RemoteExtractionError> {
    let document_type = match (raw.document_type.as_deref(), raw.is_shipping_label) {
        (Some(label), flag) => {
            let kind = kind_from_label(label);
            if let Some(flag) = flag {
                if flag != kind.is_shipping_label() {
                    tracing::warn!(
                        document_type = label,
                        is_shipping_label = flag,
                        "Model returned inconsistent classification, trusting documentType"
                    );
                }
            }
            kind
        }
        (None, Some(true)) => DocumentKind::ShippingLabel,
        (None, Some(false)) => DocumentKind::Other,
        (None, None) => {
            return Err(RemoteExtractionError::SchemaMismatch(
                "neither documentType nor isShippingLabel present".into(),
            ))
        }
    };

    let tracking_number = match raw.tracking_number {
        Some(value) => scalar_to_string(&value, "trackingNumber")?,
        None => None,
    };

    let origin_address = parse_address(raw.origin_address, "originAddress")?;
    let destination_address = parse_address(raw.destination_address, "destinationAddress")?;

    let message = raw
        .message
        .and_then(|m| clean_text(&m))
        .unwrap_or_else(|| {
            if document_type.is_shipping_label() {
                SHIPPING_LABEL_MESSAGE.to_string()
            } else {
                DEFAULT_PROCESSED_MESSAGE.to_string()
            }
        });

    Ok(ExtractedDocument {
        document_type,
        tracking_number,
        origin_address,
        destination_address,
        message,
    })
}

/// Map the model's document type onto the two kinds we persist.
/// `shipping_label`, `Shipping Label` and `SHIPPING-LABEL` all count; anything
/// else (invoice, receipt, other, ...) is `Other`.
fn kind_from_label(label: &str) -> DocumentKind {
    let normalized: String = label
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    if normalized == DocumentKind::ShippingLabel.as_str() {
        DocumentKind::ShippingLabel
    } else {
        DocumentKind::Other
    }
}

fn parse_address(value: Option<Value>, field: &str) -> Result<Option<Address>, RemoteExtractionError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(RemoteExtractionError::SchemaMismatch(format!(
                "{field} must be an object or null, got {other}"
            )))
        }
    };

    let get = |key: &str| -> Result<Option<String>, RemoteExtractionError> {
        match map.get(key) {
            Some(v) => scalar_to_string(v, &format!("{field}.{key}")),
            None => Ok(None),
        }
    };

    let zip = match get("zip")? {
        Some(zip) => Some(zip),
        None => get("zipCode")?,
    };

    let address = Address {
        name: get("name")?,
        phone: get("phone")?,
        street: get("street")?,
        city: get("city")?,
        state: get("state")?,
        zip,
        country: get("country")?,
    };

    Ok(if address.is_empty() { None } else { Some(address) })
}

/// Strings and numbers are accepted (models like to emit zips as numbers).
fn scalar_to_string(value: &Value, field: &str) -> Result<Option<String>, RemoteExtractionError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(clean_text(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(RemoteExtractionError::SchemaMismatch(format!(
            "{field} must be a string or null, got {other}"
        ))),
    }
}

/// Blank strings and a quoted "null" both mean "not determined".
fn clean_text(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}
