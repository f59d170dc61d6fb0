//! File-based logging for the agent.
//!
//! The agent writes human-facing output to stdout, so diagnostics go to
//! a rolling file under `~/.fieldnote/logs/` instead of the terminal.
//! The returned guard must stay alive for the process lifetime or
//! buffered lines are lost.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use fieldnote_core::StorageConfig;

pub fn init() -> Option<WorkerGuard> {
    let storage = StorageConfig::default();
    if fs_err::create_dir_all(storage.logs_dir()).is_err() {
        return None;
    }

    let appender = tracing_appender::rolling::daily(storage.logs_dir(), "agent.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let debug_enabled = env::var("FIELDNOTE_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}
