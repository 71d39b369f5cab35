//! Scrubbing of credentials from text that is about to be logged or shown.

use once_cell::sync::Lazy;
use regex::Regex;

/// URLs carrying `user:password@` credentials.
static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s/]+:[^@\s]+@").expect("valid regex"));

/// Runs of 32+ key-like characters (API keys, bearer tokens).
static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}").expect("valid regex")
});

/// Redact sensitive information from a message.
///
/// Redaction rules:
/// - URLs with embedded credentials keep their scheme and host only
/// - long key-like tokens become `[REDACTED_KEY]`
///
/// Everything else is preserved so the message stays useful for debugging.
#[must_use]
pub fn redact(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    POTENTIAL_KEY
        .replace_all(&redacted, "${1}[REDACTED_KEY]")
        .into_owned()
}
