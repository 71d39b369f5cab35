//! Normalizing provider message content to plain text.

use serde_json::Value;

/// Collapse a content value into a single string.
///
/// Providers return either a string or a list of content parts. Parts that
/// carry a `text` field contribute that text; bare strings contribute
/// themselves; anything else contributes its JSON rendering. Parts are joined
/// with a single space. `null` becomes the empty string.
#[must_use]
pub fn flatten_content(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(part_text)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => part_text(value),
        other => other.to_string(),
    }
}

fn part_text(part: &Value) -> String {
    match part {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => part.to_string(),
        },
        other => other.to_string(),
    }
}
