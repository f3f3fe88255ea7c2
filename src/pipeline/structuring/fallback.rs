use std::sync::LazyLock;

use regex::Regex;

use super::types::{Address, ExtractedDocument, SHIPPING_LABEL_MESSAGE};
use crate::models::enums::DocumentKind;

/// Message for text the fallback does not consider a shipping label.
pub const NOT_A_LABEL_MESSAGE: &str = "Document does not appear to be a shipping label";

/// Country assumed for every address the fallback recovers.
pub const DEFAULT_COUNTRY: &str = "US";

/// A carrier tracking-number pattern.
struct CarrierPattern {
    carrier: &'static str,
    regex: Regex,
}

/// Tried in order; the first pattern with any match wins.
static TRACKING_PATTERNS: LazyLock<Vec<CarrierPattern>> = LazyLock::new(|| {
    vec![
        CarrierPattern {
            carrier: "UPS",
            regex: Regex::new(r"1Z[0-9A-Z]{16}").unwrap(),
        },
        CarrierPattern {
            carrier: "FedEx",
            regex: Regex::new(r"\b[0-9]{22}\b").unwrap(),
        },
        CarrierPattern {
            carrier: "USPS",
            regex: Regex::new(r"\b[0-9]{12}\b").unwrap(),
        },
        CarrierPattern {
            carrier: "DHL",
            regex: Regex::new(r"\b[0-9]{20}\b").unwrap(),
        },
    ]
});

/// Matched against the upper-cased text as plain substrings.
const SHIPPING_KEYWORDS: &[&str] = &[
    "SHIP", "DELIVER", "FROM:", "TO:", "TRACKING", "UPS", "FEDEX", "USPS", "DHL",
];

const ORIGIN_INDICATORS: &[&str] = &["FROM:", "SHIP FROM", "SENDER"];
const DESTINATION_INDICATORS: &[&str] = &["TO:", "SHIP TO", "DELIVER TO"];

/// Deterministic pattern-based extraction. Total: never fails, no I/O.
pub fn extract_fallback(raw_text: &str) -> ExtractedDocument {
    let tracking_number = find_tracking_number(raw_text);
    let upper = raw_text.to_uppercase();
    let has_keyword = SHIPPING_KEYWORDS.iter().any(|k| upper.contains(k));

    let document_type = if has_keyword || tracking_number.is_some() {
        DocumentKind::ShippingLabel
    } else {
        DocumentKind::Other
    };

    let message = if document_type.is_shipping_label() {
        SHIPPING_LABEL_MESSAGE
    } else {
        NOT_A_LABEL_MESSAGE
    };

    ExtractedDocument {
        document_type,
        tracking_number,
        origin_address: extract_address(raw_text, ORIGIN_INDICATORS),
        destination_address: extract_address(raw_text, DESTINATION_INDICATORS),
        message: message.to_string(),
    }
}

/// First match of the highest-priority carrier pattern that matches at all.
pub fn find_tracking_number(text: &str) -> Option<String> {
    TRACKING_PATTERNS.iter().find_map(|pattern| {
        pattern.regex.find(text).map(|m| {
            tracing::debug!(carrier = pattern.carrier, "Tracking number pattern matched");
            m.as_str().to_string()
        })
    })
}

/// Positional address slice: the three lines after the first line containing
/// an indicator are name, street and "city, state zip".
///
/// Indicators are tried in order. An indicator whose line has fewer than three
/// lines after it does not count, and the next indicator is tried.
pub fn extract_address(text: &str, indicators: &[&str]) -> Option<Address> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    for indicator in indicators {
        let Some(idx) = lines
            .iter()
            .position(|line| line.to_uppercase().contains(indicator))
        else {
            continue;
        };
        if idx + 3 >= lines.len() {
            continue;
        }

        let (city, state, zip) = split_city_line(lines[idx + 3]);
        return Some(Address {
            name: non_empty(lines[idx + 1]),
            phone: None,
            street: non_empty(lines[idx + 2]),
            city,
            state,
            zip,
            country: Some(DEFAULT_COUNTRY.to_string()),
        });
    }
    None
}

/// "New York, NY 10001" → ("New York", "NY", "10001").
///
/// Without a comma the whole line is the city. With a single token after the
/// comma it is the state and there is no zip.
fn split_city_line(line: &str) -> (Option<String>, Option<String>, Option<String>) {
    match line.split_once(',') {
        Some((city, rest)) => {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let state = tokens.first().and_then(|t| non_empty(t));
            let zip = if tokens.len() >= 2 {
                tokens.last().and_then(|t| non_empty(t))
            } else {
                None
            };
            (non_empty(city), state, zip)
        }
        None => (non_empty(line), None, None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
