//! Process-scoped state owned by the daemon.
//!
//! All store mutations funnel through one mutex so read-modify-write
//! sequences never interleave (the daemon is the single writer). Activity
//! counters and the open-connection registry live here as well; handlers
//! receive this state by reference rather than reading ambient globals.

use std::collections::HashMap;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fieldnote_core::store::{ContextMap, Store};
use fieldnote_daemon_protocol::{
    ActivityStats, ContextEntry, ErrorInfo, FinalReport, PageSummary, Response, SummaryMap,
};

use crate::stats::StatsCounters;

pub struct SharedState {
    store: Mutex<Store>,
    stats: Mutex<StatsCounters>,
    clients: ClientRegistry,
    reports_dir: PathBuf,
}

impl SharedState {
    pub fn new(store: Store, reports_dir: PathBuf) -> Self {
        Self {
            store: Mutex::new(store),
            stats: Mutex::new(StatsCounters::default()),
            clients: ClientRegistry::default(),
            reports_dir,
        }
    }

    pub fn reports_dir(&self) -> &PathBuf {
        &self.reports_dir
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Resets the summaries mapping, sets the current activity, and adds
    /// the name to the known-activities list if absent. Stats restart at
    /// one page visited.
    pub fn start_activity(&self, activity: &str) -> Result<(), String> {
        {
            let store = self.store();
            store.set_summaries(&SummaryMap::new())?;
            store.set_current_activity(Some(activity))?;
            let mut activities = store.activities()?;
            if !activities.iter().any(|known| known == activity) {
                activities.push(activity.to_string());
                store.set_activities(&activities)?;
            }
        }
        self.stats().start();
        self.broadcast_stats();
        tracing::info!(activity, "Activity started");
        Ok(())
    }

    pub fn record_summary(&self, url: &str, summary: &str) -> Result<(), String> {
        {
            let store = self.store();
            let mut summaries = store.summaries()?;
            let memos = summaries
                .remove(url)
                .map(|page| page.memos)
                .unwrap_or_default();
            summaries.insert(
                url.to_string(),
                PageSummary {
                    summary: summary.to_string(),
                    memos,
                },
            );
            store.set_summaries(&summaries)?;
        }
        self.stats().record_page();
        self.broadcast_stats();
        Ok(())
    }

    pub fn append_important_context(&self, url: &str, text: &str) -> Result<(), String> {
        let store = self.store();
        let mut contexts = store.important_contexts()?;
        contexts
            .entry(url.to_string())
            .or_default()
            .push(ContextEntry::new(text));
        store.set_important_contexts(&contexts)
    }

    /// Appends a memo to an existing important-context entry. The entry
    /// must already exist; nothing is written otherwise.
    pub fn add_context_memo(
        &self,
        url: &str,
        context_index: usize,
        memo: &str,
    ) -> Result<(), ErrorInfo> {
        {
            let store = self.store();
            let mut contexts = store
                .important_contexts()
                .map_err(|err| ErrorInfo::new("store_error", err))?;
            let entry = contexts
                .get_mut(url)
                .and_then(|entries| entries.get_mut(context_index))
                .ok_or_else(|| ErrorInfo::new("context_not_found", "Context not found"))?;
            entry.memos.push(memo.to_string());
            store
                .set_important_contexts(&contexts)
                .map_err(|err| ErrorInfo::new("store_error", err))?;
        }
        self.stats().record_memo();
        self.broadcast_stats();
        Ok(())
    }

    pub fn current_activity(&self) -> Result<Option<String>, String> {
        self.store().current_activity()
    }

    pub fn important_contexts(&self) -> Result<ContextMap, String> {
        self.store().important_contexts()
    }

    /// Persists the final report and closes the activity. Counters go
    /// back to their no-activity state.
    pub fn finish_activity(&self, activity: &str, report: FinalReport) -> Result<(), String> {
        {
            let store = self.store();
            let mut reports = store.final_reports()?;
            reports.insert(activity.to_string(), report);
            store.set_final_reports(&reports)?;
            store.set_current_activity(None)?;
        }
        self.stats().reset();
        self.broadcast_stats();
        tracing::info!(activity, "Activity ended and report saved");
        Ok(())
    }

    pub fn render_reports(&self) -> Result<PathBuf, String> {
        let store = self.store();
        crate::report::render_all(&store, &self.reports_dir)
    }

    pub fn stats_snapshot(&self) -> ActivityStats {
        self.stats().snapshot()
    }

    pub fn broadcast_stats(&self) {
        let frame = Response::broadcast(self.stats_snapshot());
        self.clients.broadcast(&frame);
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, StatsCounters> {
        self.stats.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Open connections, one writer handle per connected client. Replies and
/// broadcasts share the per-client mutex so frames never interleave.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<u64, Arc<Mutex<UnixStream>>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn register(&self, stream: UnixStream) -> (u64, Arc<Mutex<UnixStream>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let writer = Arc::new(Mutex::new(stream));
        self.clients
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(id, Arc::clone(&writer));
        (id, writer)
    }

    pub fn unregister(&self, id: u64) {
        self.clients
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&id);
    }

    pub fn broadcast(&self, frame: &Response) {
        let payload = match serde_json::to_vec(frame) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize broadcast frame");
                return;
            }
        };

        let writers: Vec<(u64, Arc<Mutex<UnixStream>>)> = {
            let clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());
            clients
                .iter()
                .map(|(id, writer)| (*id, Arc::clone(writer)))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, writer) in writers {
            let mut stream = writer.lock().unwrap_or_else(|err| err.into_inner());
            let result = stream
                .write_all(&payload)
                .and_then(|_| stream.write_all(b"\n"))
                .and_then(|_| stream.flush());
            if result.is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());
            for id in dead {
                clients.remove(&id);
                tracing::debug!(client_id = id, "Dropped dead connection during broadcast");
            }
        }
    }
}
