//! Fieldnote daemon entrypoint.
//!
//! A small, single-writer service that owns the research-activity store.
//! Clients hold persistent socket connections: requests are
//! newline-delimited JSON frames, replies carry the request id, and
//! unsolicited stats broadcasts (no id) are pushed to every open
//! connection once a second and immediately after any counter change.

use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fieldnote_core::{ModelConfig, StorageConfig, Store};
use fieldnote_daemon_protocol::{parse_request, Response, MAX_REQUEST_BYTES};

mod llm;
mod report;
mod router;
mod state;
mod stats;
mod synthesis;

use llm::LlmClient;
use state::SharedState;

const STATS_BROADCAST_INTERVAL_SECS: u64 = 1;

fn main() {
    init_logging();

    let storage = StorageConfig::default();
    if let Err(err) = storage.ensure_dirs() {
        error!(error = %err, "Failed to prepare storage directories");
        std::process::exit(1);
    }

    let socket_path = storage.socket_file();
    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Fieldnote daemon started");

    let store = match Store::open(storage.store_file()) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "Failed to open store");
            std::process::exit(1);
        }
    };

    let model_config = match ModelConfig::load(&storage.config_file()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load model config; using defaults");
            ModelConfig::default()
        }
    };
    info!(
        endpoint = %model_config.endpoint,
        model = %model_config.model,
        "Model config loaded"
    );

    let shared_state = Arc::new(SharedState::new(store, storage.reports_dir()));
    let llm = Arc::new(LlmClient::new(model_config));

    spawn_stats_broadcaster(Arc::clone(&shared_state));

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                let llm = Arc::clone(&llm);
                thread::spawn(move || handle_connection(stream, state, llm));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("FIELDNOTE_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs_err::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn spawn_stats_broadcaster(state: Arc<SharedState>) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(STATS_BROADCAST_INTERVAL_SECS));
        state.broadcast_stats();
    });
}

/// Serves one client until it hangs up. The connection is registered for
/// broadcasts for its whole lifetime; replies go through the same shared
/// writer so frames never interleave with broadcast frames.
fn handle_connection(stream: UnixStream, state: Arc<SharedState>, llm: Arc<LlmClient>) {
    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(err) => {
            warn!(error = %err, "Failed to clone client stream");
            return;
        }
    };
    let (client_id, writer) = state.clients().register(stream);
    tracing::debug!(client_id, "Client connected");

    serve_client(reader, &writer, &state, &llm);

    state.clients().unregister(client_id);
    tracing::debug!(client_id, "Client disconnected");
}

fn serve_client(
    mut reader: BufReader<UnixStream>,
    writer: &Mutex<UnixStream>,
    state: &SharedState,
    llm: &LlmClient,
) {
    let mut line = Vec::new();
    loop {
        line.clear();
        match read_frame(&mut reader, &mut line) {
            Ok(FrameRead::Eof) => return,
            Ok(FrameRead::Frame) => {}
            Ok(FrameRead::Oversize) => {
                // Cannot resync a half-read frame; close the connection.
                let response =
                    Response::error(None, "request_too_large", "request exceeded maximum size");
                let _ = write_response(writer, &response);
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to read request frame");
                return;
            }
        }

        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let response = match parse_request(&line) {
            Ok(request) => {
                tracing::debug!(action = ?request.action, id = ?request.id, "Request received");
                router::handle_request(request, state, llm)
            }
            Err(err) => {
                warn!(code = %err.code, message = %err.message, "Rejected request");
                Response::error_with_info(None, err)
            }
        };

        if write_response(writer, &response).is_err() {
            return;
        }
    }
}

enum FrameRead {
    Eof,
    Frame,
    Oversize,
}

/// Reads one newline-delimited frame, never buffering more than the
/// request size cap.
fn read_frame(reader: &mut BufReader<UnixStream>, line: &mut Vec<u8>) -> std::io::Result<FrameRead> {
    let read = reader
        .by_ref()
        .take(MAX_REQUEST_BYTES as u64 + 1)
        .read_until(b'\n', line)?;
    if read == 0 {
        return Ok(FrameRead::Eof);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        return Ok(FrameRead::Frame);
    }
    if line.len() > MAX_REQUEST_BYTES {
        return Ok(FrameRead::Oversize);
    }
    // Final frame before EOF may lack the trailing newline.
    Ok(FrameRead::Frame)
}

fn write_response(writer: &Mutex<UnixStream>, response: &Response) -> std::io::Result<()> {
    let mut stream = writer.lock().unwrap_or_else(|err| err.into_inner());
    serde_json::to_writer(&mut *stream, response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
