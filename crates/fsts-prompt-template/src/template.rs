//! `{name}` placeholder templates.
//!
//! Placeholders are identifiers in single braces. `{{` and `}}` render as
//! literal braces. Anything else inside braces is a template error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(Cow<'a, str>),
    Placeholder(&'a str),
}

/// Split a template into literal text and placeholders.
///
/// # Errors
///
/// Returns a description of the first syntax problem: an unclosed `{`, a
/// stray `}`, or a placeholder that is not an identifier.
pub(crate) fn parse(template: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        text.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            text.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            text.push('}');
            rest = after;
        } else if tail.starts_with('}') {
            return Err(format!("unmatched '}}' at byte {}", template.len() - tail.len()));
        } else {
            let close = tail
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' at byte {}", template.len() - tail.len()))?;
            let name = &tail[1..close];
            if !IDENTIFIER.is_match(name) {
                return Err(format!("'{{{name}}}' is not a valid placeholder name"));
            }
            if !text.is_empty() {
                segments.push(Segment::Text(Cow::Owned(std::mem::take(&mut text))));
            }
            segments.push(Segment::Placeholder(name));
            rest = &tail[close + 1..];
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(Cow::Owned(text)));
    }
    Ok(segments)
}

/// Placeholder names in first-occurrence order, without duplicates.
///
/// # Errors
///
/// Same as the template parser.
pub fn placeholders(template: &str) -> Result<Vec<String>, String> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Anything that can supply text for a named placeholder.
///
/// The pipeline state implements this; [`ParameterOverlay`] layers
/// stage-computed values on top of it.
pub trait ParameterSource {
    /// Text for `name`, or `None` when the value is not available.
    fn parameter(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl ParameterSource for BTreeMap<String, String> {
    fn parameter(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// Values computed by a stage, consulted before a fallback source.
pub struct ParameterOverlay<'a> {
    values: BTreeMap<&'static str, String>,
    fallback: &'a dyn ParameterSource,
}

impl<'a> ParameterOverlay<'a> {
    #[must_use]
    pub fn new(fallback: &'a dyn ParameterSource) -> Self {
        Self {
            values: BTreeMap::new(),
            fallback,
        }
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }
}

impl ParameterSource for ParameterOverlay<'_> {
    fn parameter(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.values.get(name) {
            Some(value) => Some(Cow::Borrowed(value.as_str())),
            None => self.fallback.parameter(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_in_first_occurrence_order() {
        let names = placeholders("{b} then {a} then {b} again").unwrap();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_escaped_braces_are_not_placeholders() {
        let names = placeholders("json: {{\"k\": 1}} and {value}").unwrap();
        assert_eq!(names, vec!["value".to_string()]);

        let segments = parse("{{x}}").unwrap();
        assert_eq!(segments, vec![Segment::Text(Cow::Owned("{x}".to_string()))]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(placeholders("open { never closed").is_err());
        assert!(placeholders("stray } brace").is_err());
        assert!(placeholders("{0}").is_err());
        assert!(placeholders("{state['x']}").is_err());
        assert!(placeholders("{}").is_err());
    }

    #[test]
    fn test_overlay_prefers_own_values() {
        let mut base = BTreeMap::new();
        base.insert("a".to_string(), "base-a".to_string());
        base.insert("b".to_string(), "base-b".to_string());

        let overlay = ParameterOverlay::new(&base).with("a", "overlay-a");
        assert_eq!(overlay.parameter("a").as_deref(), Some("overlay-a"));
        assert_eq!(overlay.parameter("b").as_deref(), Some("base-b"));
        assert_eq!(overlay.parameter("c"), None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn escaped_text_renders_back_unchanged(text in ".*") {
                let escaped = text.replace('{', "{{").replace('}', "}}");
                let segments = parse(&escaped).unwrap();
                let rendered: String = segments
                    .iter()
                    .map(|s| match s {
                        Segment::Text(t) => t.to_string(),
                        Segment::Placeholder(_) => unreachable!("no placeholders in escaped text"),
                    })
                    .collect();
                prop_assert_eq!(rendered, text);
            }

            #[test]
            fn parser_never_panics(template in "[a-z{} _]{0,40}") {
                let _ = parse(&template);
            }
        }
    }
}
