//! Usage aggregation for completion calls.
//!
//! A [`UsageLog`] is created once per host process and shared (behind an
//! `Arc`) by every run. Stages append the raw provider usage record of each
//! completion; reporting sums those records into a flat counter map.
//!
//! Provider records have no fixed schema. Numeric leaves are summed, nested
//! objects are flattened one level into dotted keys (`detail.a`), and anything
//! else is ignored, so new keys appear in summaries without code changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{trace, warn};

use fsts_utils::types::StageId;

/// One recorded completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub run_id: String,
    pub stage: StageId,
    pub usage: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

/// A summed counter. Integer counts stay exact; a counter becomes an
/// amount as soon as any contribution is fractional (e.g. cost fields).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tally {
    Count(u64),
    Amount(f64),
}

impl Tally {
    fn from_number(value: &Value) -> Option<Self> {
        if let Some(n) = value.as_u64() {
            return Some(Self::Count(n));
        }
        value.as_f64().map(Self::Amount)
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Count(n) => n as f64,
            Self::Amount(x) => x,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Count(a), Self::Count(b)) => Self::Count(a.saturating_add(b)),
            (a, b) => Self::Amount(a.as_f64() + b.as_f64()),
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Amount(x) => write!(f, "{x:.4}"),
        }
    }
}

/// Counter name to total, ordered by name.
pub type UsageSummary = BTreeMap<String, Tally>;

/// Append-only usage log, safe to share across concurrent runs.
#[derive(Debug, Default)]
pub struct UsageLog {
    entries: Mutex<Vec<UsageEntry>>,
}

impl UsageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one usage record.
    pub fn record(&self, run_id: &str, stage: StageId, usage: Map<String, Value>) {
        let entry = UsageEntry {
            run_id: run_id.to_string(),
            stage,
            usage,
            recorded_at: Utc::now(),
        };
        trace!(run_id, stage = %stage, "Recording usage");
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            // A panic while holding the lock cannot leave a half-pushed entry,
            // so the data is still consistent.
            Err(poisoned) => {
                warn!("Usage log lock was poisoned; recovering");
                poisoned.into_inner().push(entry);
            }
        }
    }

    /// Snapshot of all entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<UsageEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Totals over every entry in the log.
    #[must_use]
    pub fn summarize(&self) -> UsageSummary {
        summarize(&self.entries())
    }

    /// Totals over the entries of a single run.
    #[must_use]
    pub fn summarize_run(&self, run_id: &str) -> UsageSummary {
        let entries: Vec<UsageEntry> = self
            .entries()
            .into_iter()
            .filter(|e| e.run_id == run_id)
            .collect();
        summarize(&entries)
    }
}

/// Sum a set of entries into flat counters.
#[must_use]
pub fn summarize(entries: &[UsageEntry]) -> UsageSummary {
    let mut totals = UsageSummary::new();
    for entry in entries {
        for (key, value) in flatten(&entry.usage) {
            totals
                .entry(key)
                .and_modify(|t| *t = t.add(value))
                .or_insert(value);
        }
    }
    totals
}

/// Flatten one level of nesting into dotted keys, keeping numeric leaves.
fn flatten(usage: &Map<String, Value>) -> Vec<(String, Tally)> {
    let mut out = Vec::new();
    for (key, value) in usage {
        match value {
            Value::Object(inner) => {
                for (sub, leaf) in inner {
                    if let Some(t) = Tally::from_number(leaf) {
                        out.push((format!("{key}.{sub}"), t));
                    }
                }
            }
            other => {
                if let Some(t) = Tally::from_number(other) {
                    out.push((key.clone(), t));
                }
            }
        }
    }
    out
}
