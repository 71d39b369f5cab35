//! Turning the manager's final answer into the document that gets written.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Chat-style lead-in lines models put before the document.
static PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)as the project manager|here is the consolidated specification document|as\s+(an|a)\s+ai|i have reviewed the feedback|facilitated discussions|the following document is|this version is now ready|final, consolidated functional|\*\*\*|^ai:|^assistant:|^system:|^human:",
    )
    .expect("valid regex")
});

/// The cleaned document plus the lines that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedDocument {
    pub text: String,
    pub removed: Vec<String>,
}

fn is_route_line(line: &str) -> bool {
    line.to_ascii_lowercase().starts_with("[route:")
}

fn starts_document(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with('|')
        || line.starts_with("**Page")
        || line.to_ascii_lowercase().starts_with("table of contents")
}

/// Strip route directives, leading preamble and blank edges.
///
/// Route lines are removed wherever they appear (any letter case). Before the
/// document starts, blank lines and recognizable preamble are dropped; a
/// heading, table row, page marker, `Table of Contents`, or any other line
/// starts the document, after which everything except route lines is kept.
#[must_use]
pub fn clean_markdown(markdown: &str) -> CleanedDocument {
    let mut kept: Vec<&str> = Vec::new();
    let mut removed = Vec::new();
    let mut started = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if is_route_line(trimmed) {
            removed.push(line.to_string());
            continue;
        }
        if started || starts_document(trimmed) {
            started = true;
            kept.push(line);
            continue;
        }
        if trimmed.is_empty() || PREAMBLE.is_match(trimmed) {
            removed.push(line.to_string());
            continue;
        }
        started = true;
        kept.push(line);
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }

    if !removed.is_empty() {
        debug!(count = removed.len(), "Dropped non-document lines from deliverable");
    }

    CleanedDocument {
        text: kept.join("\n"),
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_lines_are_removed_anywhere() {
        let doc = "# Spec\n\nBody\n[ROUTE: final_output]\nMore\n  [route: output_reviewer]\n";
        let cleaned = clean_markdown(doc);
        assert_eq!(cleaned.text, "# Spec\n\nBody\nMore");
        assert_eq!(cleaned.removed.len(), 2);
    }

    #[test]
    fn test_preamble_before_heading_is_dropped() {
        let doc = "As the project manager, I consolidated everything.\n\nHere is the consolidated specification document:\n# Functional Specification\nText";
        let cleaned = clean_markdown(doc);
        assert_eq!(cleaned.text, "# Functional Specification\nText");
    }

    #[test]
    fn test_plain_first_line_starts_document() {
        let doc = "\n\nOverview of report ZDEMO\n\nAs an AI I wrote this.";
        let cleaned = clean_markdown(doc);
        assert_eq!(cleaned.text, "Overview of report ZDEMO\n\nAs an AI I wrote this.");
    }

    #[test]
    fn test_table_and_toc_start_document() {
        assert_eq!(clean_markdown("\n| a | b |\n").text, "| a | b |");
        assert_eq!(
            clean_markdown("***\nTable of Contents\n1. Intro").text,
            "Table of Contents\n1. Intro"
        );
    }

    #[test]
    fn test_only_directive_yields_empty_document() {
        let cleaned = clean_markdown("[ROUTE: final_output]");
        assert!(cleaned.text.is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn no_route_line_survives(lines in proptest::collection::vec(
                prop_oneof![
                    Just("[ROUTE: final_output]".to_string()),
                    Just("[route: output_reviewer]".to_string()),
                    Just(String::new()),
                    "[#|A-Za-z ]{0,20}",
                ],
                0..12,
            )) {
                let cleaned = clean_markdown(&lines.join("\n"));
                for line in cleaned.text.lines() {
                    prop_assert!(!line.trim().to_ascii_lowercase().starts_with("[route:"));
                }
                prop_assert!(cleaned.text.lines().last().is_none_or(|l| !l.trim().is_empty()));
            }
        }
    }
}
