//! Local session mirror.
//!
//! The daemon owns the canonical store, but page memos are a client-side
//! concern: the agent accumulates per-page summaries and memos during an
//! activity and submits the whole mapping with `endActivity`. The mirror
//! persists across agent invocations in a small JSON file so separate
//! commands share one session.

use std::path::PathBuf;

use fieldnote_daemon_protocol::{PageSummary, SummaryMap};

pub struct SessionMirror {
    path: PathBuf,
    summaries: SummaryMap,
}

impl SessionMirror {
    pub fn load(path: PathBuf) -> Result<Self, String> {
        let summaries = if path.exists() {
            let raw = fs_err::read_to_string(&path)
                .map_err(|err| format!("Failed to read session file: {}", err))?;
            serde_json::from_str(&raw)
                .map_err(|err| format!("Session file is corrupt ({}): {}", path.display(), err))?
        } else {
            SummaryMap::new()
        };
        Ok(Self { path, summaries })
    }

    pub fn summaries(&self) -> &SummaryMap {
        &self.summaries
    }

    /// Records a fresh summary for a page, keeping any memos already
    /// attached to it.
    pub fn record_summary(&mut self, url: &str, summary: &str) -> Result<(), String> {
        let memos = self
            .summaries
            .remove(url)
            .map(|page| page.memos)
            .unwrap_or_default();
        self.summaries.insert(
            url.to_string(),
            PageSummary {
                summary: summary.to_string(),
                memos,
            },
        );
        self.save()
    }

    /// Attaches a memo to a page, creating the entry if the page has not
    /// been summarized yet.
    pub fn add_page_memo(&mut self, url: &str, memo: &str) -> Result<(), String> {
        self.summaries
            .entry(url.to_string())
            .or_default()
            .memos
            .push(memo.to_string());
        self.save()
    }

    /// Drops the mirror, both in memory and on disk. Called when an
    /// activity starts or ends.
    pub fn clear(&mut self) -> Result<(), String> {
        self.summaries.clear();
        if self.path.exists() {
            fs_err::remove_file(&self.path)
                .map_err(|err| format!("Failed to remove session file: {}", err))?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create session directory: {}", err))?;
        }
        let raw = serde_json::to_string_pretty(&self.summaries)
            .map_err(|err| format!("Failed to serialize session: {}", err))?;
        fs_err::write(&self.path, raw).map_err(|err| format!("Failed to write session: {}", err))
    }
}
