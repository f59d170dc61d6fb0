//! In-memory activity counters.
//!
//! These live only for the daemon's lifetime and are rebuilt from scratch
//! on restart; persistence is explicitly not required. Counters are zero
//! with no start time while no activity is active.

use chrono::{DateTime, Utc};
use fieldnote_daemon_protocol::ActivityStats;

#[derive(Debug, Default)]
pub struct StatsCounters {
    pages_visited: u64,
    memos_added: u64,
    started_at: Option<DateTime<Utc>>,
}

impl StatsCounters {
    /// Activity start: the starting page counts as visited.
    pub fn start(&mut self) {
        self.pages_visited = 1;
        self.memos_added = 0;
        self.started_at = Some(Utc::now());
    }

    pub fn record_page(&mut self) {
        self.pages_visited += 1;
    }

    pub fn record_memo(&mut self) {
        self.memos_added += 1;
    }

    pub fn reset(&mut self) {
        self.pages_visited = 0;
        self.memos_added = 0;
        self.started_at = None;
    }

    pub fn snapshot(&self) -> ActivityStats {
        self.snapshot_at(Utc::now())
    }

    fn snapshot_at(&self, now: DateTime<Utc>) -> ActivityStats {
        ActivityStats {
            pages_visited: self.pages_visited,
            memos_added: self.memos_added,
            time_spent: format_elapsed(self.started_at, now),
        }
    }
}

/// "m:ss" elapsed time; "0:00" when no activity is running.
fn format_elapsed(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let seconds = started_at
        .map(|started| (now - started).num_seconds().max(0))
        .unwrap_or(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
