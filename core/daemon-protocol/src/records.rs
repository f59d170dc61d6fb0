//! Persisted record shapes shared between the store, the wire, and the
//! report renderer.
//!
//! Field names serialize in camelCase so data written by the daemon stays
//! byte-compatible with the original extension's storage layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `summaries` store key: page url -> summary + page-level memos.
pub type SummaryMap = BTreeMap<String, PageSummary>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub summary: String,
    #[serde(default)]
    pub memos: Vec<String>,
}

/// One highlighted snippet on a page, with its own memo thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub text: String,
    #[serde(default)]
    pub memos: Vec<String>,
}

impl ContextEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            memos: Vec::new(),
        }
    }
}

/// Synthesized end-of-activity report, keyed by activity name in the
/// `finalReports` store key. Immutable once written; reusing an activity
/// name overwrites the previous report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub summaries: SummaryMap,
    pub important_contexts: BTreeMap<String, Vec<ContextEntry>>,
    pub connections: Vec<String>,
    pub overall_summary: String,
}

/// Snapshot of the daemon's in-memory activity counters. Not persisted;
/// rebuilt from scratch when the daemon restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub pages_visited: u64,
    pub memos_added: u64,
    /// Elapsed time since the activity started, formatted "m:ss".
    pub time_spent: String,
}
