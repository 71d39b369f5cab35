//! Route directive extraction.
//!
//! The manager ends its answer with `[ROUTE: <stage>]`. Everything else in
//! the response is opaque document text. Matching is case-sensitive: the
//! keyword must be `ROUTE` and the token must be a stage name exactly as
//! written in [`StageId::as_str`]. Anything the parser cannot use resolves to
//! [`StageId::OutputReviewer`], so bad directives cost one more review rather
//! than ending the run early.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use fsts_llm::flatten_content;
use fsts_utils::types::StageId;

/// Stage used when no usable directive is present.
pub const DEFAULT_ROUTE: StageId = StageId::OutputReviewer;

static ROUTE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[ROUTE:\s*(\w+)\]").expect("valid regex"));

/// The token of the first directive in `content`, if any.
#[must_use]
pub fn route_token(content: &str) -> Option<&str> {
    ROUTE_DIRECTIVE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Resolve the route named by the first directive in `content`.
///
/// Returns [`DEFAULT_ROUTE`] when there is no directive, or when its token is
/// not a stage the manager may route to.
#[must_use]
pub fn parse_route(content: &str) -> StageId {
    route_token(content)
        .and_then(StageId::parse)
        .filter(StageId::is_route_target)
        .unwrap_or(DEFAULT_ROUTE)
}

/// [`parse_route`] for a structured message body.
///
/// Strings are used as-is; lists of content parts are joined first. Other
/// shapes are rendered to text, which normally yields the default route.
#[must_use]
pub fn parse_route_value(content: &Value) -> StageId {
    parse_route(&flatten_content(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trailing_directive_is_found() {
        assert_eq!(
            parse_route("...text... [ROUTE: final_output]"),
            StageId::FinalOutput
        );
        assert_eq!(
            parse_route("doc\n\n[ROUTE: technical_spec_writer]\n"),
            StageId::TechnicalSpecWriter
        );
    }

    #[test]
    fn test_missing_directive_defaults_to_review() {
        assert_eq!(parse_route("# Spec\n\nNo directive here."), StageId::OutputReviewer);
        assert_eq!(parse_route(""), StageId::OutputReviewer);
        assert_eq!(parse_route("[ROUTE: ]"), StageId::OutputReviewer);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(parse_route("[route: FINAL_OUTPUT]"), StageId::OutputReviewer);
        assert_eq!(parse_route("[ROUTE: FINAL_OUTPUT]"), StageId::OutputReviewer);
        assert_eq!(parse_route("[Route: final_output]"), StageId::OutputReviewer);
    }

    #[test]
    fn test_first_directive_wins() {
        let content = "[ROUTE: final_output] then later [ROUTE: output_reviewer]";
        assert_eq!(parse_route(content), StageId::FinalOutput);

        // An unusable first token is not skipped in favour of a later one.
        let content = "[ROUTE: nowhere] and [ROUTE: final_output]";
        assert_eq!(route_token(content), Some("nowhere"));
        assert_eq!(parse_route(content), StageId::OutputReviewer);
    }

    #[test]
    fn test_non_target_stages_default() {
        assert_eq!(parse_route("[ROUTE: manager_agent]"), StageId::OutputReviewer);
        assert_eq!(parse_route("[ROUTE: abap_code_analyst]"), StageId::OutputReviewer);
    }

    #[test]
    fn test_whitespace_after_colon_is_optional() {
        assert_eq!(parse_route("[ROUTE:final_output]"), StageId::FinalOutput);
        assert_eq!(parse_route("[ROUTE:   final_output]"), StageId::FinalOutput);
    }

    #[test]
    fn test_structured_content_is_normalized() {
        let parts = json!([
            {"type": "text", "text": "Document body."},
            {"type": "text", "text": "[ROUTE: final_output]"}
        ]);
        assert_eq!(parse_route_value(&parts), StageId::FinalOutput);
        assert_eq!(
            parse_route_value(&json!("[ROUTE: functional_spec_drafter]")),
            StageId::FunctionalSpecDrafter
        );
        assert_eq!(parse_route_value(&Value::Null), StageId::OutputReviewer);
        assert_eq!(parse_route_value(&json!({"unexpected": 1})), StageId::OutputReviewer);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_never_panics_and_yields_route_target(s in ".*") {
                prop_assert!(parse_route(&s).is_route_target());
            }

            #[test]
            fn trailing_directive_is_honored(body in "[^\\[]*", idx in 0usize..5) {
                let targets = [
                    StageId::ForeignDependencyAgent,
                    StageId::FunctionalSpecDrafter,
                    StageId::TechnicalSpecWriter,
                    StageId::OutputReviewer,
                    StageId::FinalOutput,
                ];
                let target = targets[idx];
                let content = format!("{body}\n[ROUTE: {target}]");
                prop_assert_eq!(parse_route(&content), target);
            }
        }
    }
}
