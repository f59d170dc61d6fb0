//! SQLite-backed key/value store for Fieldnote.
//!
//! One `kv` table with JSON values, keyed by the namespaced names the
//! data model defines (`activities`, `currentActivity`, `summaries`,
//! `importantContexts`, `finalReports`). The daemon is the only writer;
//! read-only consumers (the report viewer) open with `open_read_only`.
//! Serialization of read-modify-write sequences is the daemon's job, not
//! this type's.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use fieldnote_daemon_protocol::{ContextEntry, FinalReport, SummaryMap};

pub mod keys {
    pub const ACTIVITIES: &str = "activities";
    pub const CURRENT_ACTIVITY: &str = "currentActivity";
    pub const SUMMARIES: &str = "summaries";
    pub const IMPORTANT_CONTEXTS: &str = "importantContexts";
    pub const FINAL_REPORTS: &str = "finalReports";
}

pub type ContextMap = BTreeMap<String, Vec<ContextEntry>>;
pub type ReportMap = BTreeMap<String, FinalReport>;

pub struct Store {
    path: PathBuf,
    read_only: bool,
}

impl Store {
    pub fn open(path: PathBuf) -> Result<Self, String> {
        let store = Self {
            path,
            read_only: false,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an existing store without write access. Fails if the store
    /// has never been created by the daemon.
    pub fn open_read_only(path: PathBuf) -> Result<Self, String> {
        if !path.exists() {
            return Err(format!("store does not exist at {}", path.display()));
        }
        Ok(Self {
            path,
            read_only: true,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, String> {
        self.with_connection(|conn| {
            let raw: Option<String> = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| format!("Failed to read key {}: {}", key, err))?;

            match raw {
                Some(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw)
                        .map_err(|err| format!("Failed to parse value for {}: {}", key, err))?;
                    if value.is_null() {
                        return Ok(None);
                    }
                    serde_json::from_value(value)
                        .map(Some)
                        .map_err(|err| format!("Failed to decode value for {}: {}", key, err))
                }
                None => Ok(None),
            }
        })
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        let raw = serde_json::to_string(value)
            .map_err(|err| format!("Failed to serialize value for {}: {}", key, err))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, raw],
            )
            .map_err(|err| format!("Failed to write key {}: {}", key, err))?;
            Ok(())
        })
    }

    pub fn activities(&self) -> Result<Vec<String>, String> {
        Ok(self.get(keys::ACTIVITIES)?.unwrap_or_default())
    }

    pub fn set_activities(&self, activities: &[String]) -> Result<(), String> {
        self.set(keys::ACTIVITIES, &activities)
    }

    pub fn current_activity(&self) -> Result<Option<String>, String> {
        self.get(keys::CURRENT_ACTIVITY)
    }

    pub fn set_current_activity(&self, activity: Option<&str>) -> Result<(), String> {
        self.set(keys::CURRENT_ACTIVITY, &activity)
    }

    pub fn summaries(&self) -> Result<SummaryMap, String> {
        Ok(self.get(keys::SUMMARIES)?.unwrap_or_default())
    }

    pub fn set_summaries(&self, summaries: &SummaryMap) -> Result<(), String> {
        self.set(keys::SUMMARIES, summaries)
    }

    pub fn important_contexts(&self) -> Result<ContextMap, String> {
        Ok(self.get(keys::IMPORTANT_CONTEXTS)?.unwrap_or_default())
    }

    pub fn set_important_contexts(&self, contexts: &ContextMap) -> Result<(), String> {
        self.set(keys::IMPORTANT_CONTEXTS, contexts)
    }

    pub fn final_reports(&self) -> Result<ReportMap, String> {
        Ok(self.get(keys::FINAL_REPORTS)?.unwrap_or_default())
    }

    pub fn set_final_reports(&self, reports: &ReportMap) -> Result<(), String> {
        self.set(keys::FINAL_REPORTS, reports)
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv (\
                    key TEXT PRIMARY KEY,\
                    value TEXT NOT NULL\
                 )",
                [],
            )
            .map_err(|err| format!("Failed to create kv table: {}", err))?;
            Ok(())
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let conn = if self.read_only {
            Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        } else {
            Connection::open(&self.path)
        }
        .map_err(|err| format!("Failed to open store at {}: {}", self.path.display(), err))?;
        f(&conn)
    }
}
