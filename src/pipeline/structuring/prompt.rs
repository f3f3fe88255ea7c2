pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are an AI that extracts shipping label information from OCR text.
Extract and return ONLY a JSON object with these fields:
{
  "documentType": "SHIPPING_LABEL" or "OTHER",
  "isShippingLabel": true or false,
  "trackingNumber": "extracted tracking number or null",
  "originAddress": {
    "name": "sender name",
    "phone": "phone number",
    "street": "street address",
    "city": "city",
    "state": "state",
    "zip": "zip code",
    "country": "country"
  },
  "destinationAddress": {
    "name": "recipient name",
    "phone": "phone number",
    "street": "street address",
    "city": "city",
    "state": "state",
    "zip": "zip code",
    "country": "country"
  },
  "message": "N/A if valid shipping label, otherwise describe why it is not a shipping label"
}

RULES:
1. Every field above MUST be present in your output.
2. If any field cannot be determined, use null. Never omit a field.
3. "isShippingLabel" is true exactly when "documentType" is "SHIPPING_LABEL".
4. Return only valid JSON. No prose, no Markdown.
"#;

/// Build the user turn. The OCR text is passed verbatim.
pub fn build_extraction_prompt(raw_text: &str) -> String {
    format!("Extract shipping information from this OCR text: {raw_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_every_field() {
        for field in [
            "documentType",
            "isShippingLabel",
            "trackingNumber",
            "originAddress",
            "destinationAddress",
            "message",
        ] {
            assert!(
                EXTRACTION_SYSTEM_PROMPT.contains(field),
                "system prompt should mention {field}"
            );
        }
    }

    #[test]
    fn system_prompt_requires_nulls_and_json_only() {
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("use null"));
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("Return only valid JSON"));
    }

    #[test]
    fn user_prompt_carries_text_verbatim() {
        let text = "SHIP TO:\n  Jane Doe\n\t42 Elm St  ";
        let prompt = build_extraction_prompt(text);
        assert!(prompt.ends_with(text));
    }
}
