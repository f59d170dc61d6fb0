//! Client side of the daemon connection.
//!
//! The daemon is the only writer; this client just sends requests and
//! reads frames. One persistent connection is held per invocation, so
//! unsolicited stats broadcasts (frames with no id) can arrive between a
//! request and its reply. Replies are matched by request id.

use std::env;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::sleep;
use std::time::Duration;

use fieldnote_core::StorageConfig;
use fieldnote_daemon_protocol::{Action, Reply, Request, Response, MAX_REQUEST_BYTES};

const SOCKET_ENV: &str = "FIELDNOTE_DAEMON_SOCKET";
const RECONNECT_INTERVAL_SECS: u64 = 5;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct DaemonClient {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    pub fn connect() -> Result<Self, String> {
        let socket = socket_path()?;
        let writer = UnixStream::connect(&socket).map_err(|err| {
            format!(
                "Failed to connect to daemon at {} ({}). Is fieldnote-daemon running?",
                socket.display(),
                err
            )
        })?;
        let reader = writer
            .try_clone()
            .map(BufReader::new)
            .map_err(|err| format!("Failed to clone daemon stream: {}", err))?;
        Ok(Self { writer, reader })
    }

    /// Connects and verifies the daemon answers a ping before any real
    /// work is attempted. Commands are refused outright when the daemon
    /// is unreachable or unresponsive.
    pub fn connect_checked() -> Result<Self, String> {
        let mut client = Self::connect()?;
        match client.request(Action::Ping)? {
            Reply::Pong { .. } => Ok(client),
            other => Err(format!("daemon sent an unexpected ping reply: {:?}", other)),
        }
    }

    /// Sends one action and returns its reply. Broadcast frames that
    /// arrive first are discarded.
    pub fn request(&mut self, action: Action) -> Result<Reply, String> {
        let id = next_request_id();
        let request = Request::new(id.clone(), action);
        let mut payload = serde_json::to_vec(&request)
            .map_err(|err| format!("Failed to serialize request: {}", err))?;
        payload.push(b'\n');
        self.writer
            .write_all(&payload)
            .and_then(|_| self.writer.flush())
            .map_err(|err| format!("Failed to write request: {}", err))?;

        loop {
            let response = self.read_frame()?;
            // Parse-boundary rejections cannot echo an id; an id-less
            // error frame belongs to the request in flight.
            let ours = response.id.as_deref() == Some(id.as_str())
                || (response.id.is_none() && !response.ok);
            if !ours {
                if !response.is_broadcast() {
                    tracing::warn!(id = ?response.id, "Discarding frame for another request");
                }
                continue;
            }
            if response.ok {
                return response
                    .data
                    .ok_or_else(|| "Daemon reply carried no data".to_string());
            }
            return Err(response
                .error
                .map(|err| err.message)
                .unwrap_or_else(|| "Unknown daemon error".to_string()));
        }
    }

    /// Blocks on the connection and yields every unsolicited stats frame.
    /// Returns when the daemon hangs up.
    pub fn watch_stats(&mut self, mut on_stats: impl FnMut(&Reply)) -> Result<(), String> {
        loop {
            let response = self.read_frame()?;
            if let Some(reply) = response.data.as_ref() {
                if matches!(reply, Reply::UpdateActivityStats { .. }) {
                    on_stats(reply);
                }
            }
        }
    }

    fn read_frame(&mut self) -> Result<Response, String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|err| format!("Failed to read daemon frame: {}", err))?;
        if read == 0 {
            return Err("Daemon closed the connection".to_string());
        }
        if line.len() > MAX_REQUEST_BYTES {
            return Err("Daemon frame exceeded maximum size".to_string());
        }
        serde_json::from_str(line.trim_end())
            .map_err(|err| format!("Failed to parse daemon frame: {}", err))
    }
}

/// Reconnecting loop for `watch`: connects, drains stats frames, and
/// retries after a fixed delay when the daemon is away.
pub fn watch_forever(mut on_stats: impl FnMut(&Reply)) -> ! {
    loop {
        match DaemonClient::connect() {
            Ok(mut client) => {
                tracing::info!("Connected to daemon");
                if let Err(err) = client.watch_stats(&mut on_stats) {
                    tracing::warn!(error = %err, "Watch connection lost");
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "Daemon not reachable");
            }
        }
        sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS));
    }
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(StorageConfig::default().socket_file())
}

fn next_request_id() -> String {
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req-{}-{}", std::process::id(), seq)
}
