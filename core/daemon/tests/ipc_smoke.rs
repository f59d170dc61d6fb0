use fieldnote_daemon_protocol::{
    Action, PageSummary, Reply, Request, Response, SummaryMap, PROTOCOL_VERSION,
};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> DaemonGuard {
    let child = Command::new(env!("CARGO_BIN_EXE_fieldnote-daemon"))
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn fieldnote-daemon");
    DaemonGuard { child }
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".fieldnote").join("daemon.sock")
}

/// Points the model endpoint at a port nothing listens on so any model
/// call fails immediately instead of reaching out to a real API.
fn write_unreachable_model_config(home: &Path) {
    write_model_config(home, "http://127.0.0.1:9/v1/chat/completions");
}

fn write_model_config(home: &Path, endpoint: &str) {
    let root = home.join(".fieldnote");
    std::fs::create_dir_all(&root).expect("create config dir");
    std::fs::write(
        root.join("config.toml"),
        format!("[model]\nendpoint = \"{}\"\n", endpoint),
    )
    .expect("write config");
}

fn chat_completion(content: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"message": {"content": content}}]})
}

/// Minimal chat-completion endpoint: serves one canned reply per
/// connection, in order, then exits.
fn spawn_model_stub(replies: Vec<serde_json::Value>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind model stub");
    let port = listener.local_addr().expect("stub addr").port();
    let handle = thread::spawn(move || {
        for reply in replies {
            let (mut stream, _) = listener.accept().expect("accept model request");
            read_http_request(&mut stream);
            let body = reply.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream
                .write_all(response.as_bytes())
                .expect("write model reply");
        }
    });
    (port, handle)
}

fn read_http_request(stream: &mut TcpStream) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stub stream"));
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read request header");
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if line == "\r\n" || line.is_empty() {
            break;
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("read request body");
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

/// One persistent connection, the way a real client holds one. Broadcast
/// frames can arrive at any time, so replies are matched by request id.
struct Client {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Client {
    fn connect(socket: &Path) -> Self {
        let writer = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
        let reader = BufReader::new(writer.try_clone().expect("clone stream"));
        Self { writer, reader }
    }

    fn send_raw(&mut self, frame: &str) {
        self.writer
            .write_all(frame.as_bytes())
            .expect("write frame");
        self.writer.write_all(b"\n").expect("write newline");
        self.writer.flush().expect("flush");
    }

    fn read_frame(&mut self) -> Response {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read frame");
        assert!(read > 0, "daemon closed the connection");
        serde_json::from_str(line.trim_end()).expect("parse response JSON")
    }

    fn request(&mut self, id: &str, action: Action) -> Response {
        let request = Request::new(id, action);
        self.send_raw(&serde_json::to_string(&request).expect("serialize request"));
        self.reply_for(id)
    }

    fn reply_for(&mut self, id: &str) -> Response {
        loop {
            let response = self.read_frame();
            if response.id.as_deref() == Some(id) {
                return response;
            }
            assert!(
                response.is_broadcast(),
                "unexpected frame for another id: {:?}",
                response.id
            );
        }
    }
}

#[test]
fn ping_reports_daemon_liveness() {
    let home = TempDir::new().expect("temp HOME");
    let guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let response = client.request("ping-1", Action::Ping);

    assert!(response.ok, "ping response was not ok");
    match response.data.expect("pong payload") {
        Reply::Pong {
            status,
            pid,
            protocol_version,
            ..
        } => {
            assert_eq!(status, "alive");
            assert_eq!(pid, guard.child.id());
            assert_eq!(protocol_version, PROTOCOL_VERSION);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[test]
fn protocol_mismatch_is_rejected() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    client.send_raw(r#"{"protocol_version":99,"id":"v-1","action":"ping"}"#);
    let response = client.reply_for("v-1");

    assert!(!response.ok);
    assert_eq!(response.error.expect("error payload").code, "protocol_mismatch");
}

#[test]
fn unknown_action_gets_a_dedicated_error() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    client.send_raw(r#"{"protocol_version":1,"id":"u-1","action":"teleport"}"#);

    // Parse failures cannot echo an id; take the first non-broadcast frame.
    let response = loop {
        let frame = client.read_frame();
        if !frame.is_broadcast() {
            break frame;
        }
    };
    assert!(!response.ok);
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "unknown_action");
    assert!(error.message.contains("teleport"));
}

#[test]
fn end_activity_without_activity_errors() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let response = client.request(
        "end-1",
        Action::EndActivity {
            summaries: SummaryMap::new(),
        },
    );

    assert!(!response.ok);
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "no_active_activity");
    assert_eq!(error.message, "No active activity to end");
}

#[test]
fn activity_flow_over_one_connection() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);

    let response = client.request(
        "start-1",
        Action::StartActivity {
            activity: "rust history".to_string(),
        },
    );
    assert!(response.ok, "startActivity was not ok");
    match response.data.expect("status payload") {
        Reply::UpdateActivityStatus { activity } => assert_eq!(activity, "rust history"),
        other => panic!("unexpected reply: {:?}", other),
    }

    let response = client.request(
        "ctx-1",
        Action::AppendImportantContext {
            context: "Rust 1.0 shipped in 2015".to_string(),
            url: "https://example.org/rust".to_string(),
        },
    );
    assert!(response.ok, "appendImportantContext was not ok");

    let response = client.request(
        "memo-1",
        Action::AddContextMemo {
            memo: "verify the date".to_string(),
            url: "https://example.org/rust".to_string(),
            context_index: 0,
        },
    );
    assert!(response.ok, "addContextMemo was not ok");
    match response.data.expect("memo payload") {
        Reply::UpdateMemos { memo } => assert_eq!(memo, "verify the date"),
        other => panic!("unexpected reply: {:?}", other),
    }

    let response = client.request(
        "memo-2",
        Action::AddContextMemo {
            memo: "no such context".to_string(),
            url: "https://example.org/rust".to_string(),
            context_index: 5,
        },
    );
    assert!(!response.ok);
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "context_not_found");
    assert_eq!(error.message, "Context not found");

    let response = client.request("stats-1", Action::GetActivityStats);
    assert!(response.ok, "getActivityStats was not ok");
    match response.data.expect("stats payload") {
        Reply::UpdateActivityStats { stats } => {
            assert_eq!(stats.pages_visited, 1);
            assert_eq!(stats.memos_added, 1);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[test]
fn stats_broadcasts_carry_no_id() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let response = client.request(
        "start-1",
        Action::StartActivity {
            activity: "broadcast check".to_string(),
        },
    );
    assert!(response.ok);

    // The periodic broadcaster fires every second; the next frame on an
    // idle connection must be an unsolicited stats push.
    let frame = client.read_frame();
    assert!(frame.is_broadcast(), "expected a broadcast frame");
    match frame.data.expect("broadcast payload") {
        Reply::UpdateActivityStats { stats } => assert_eq!(stats.pages_visited, 1),
        other => panic!("unexpected broadcast reply: {:?}", other),
    }
}

#[test]
fn summarize_failure_is_normalized() {
    let home = TempDir::new().expect("temp HOME");
    write_unreachable_model_config(home.path());
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let response = client.request(
        "sum-1",
        Action::Summarize {
            content: "page body".to_string(),
            url: "https://example.org/a".to_string(),
        },
    );

    assert!(!response.ok);
    let error = response.error.expect("error payload");
    assert_eq!(error.code, "llm_error");
    assert_eq!(error.message, "Failed to generate content. Please try again later.");
}

#[test]
fn full_activity_flow_produces_a_final_report() {
    let home = TempDir::new().expect("temp HOME");
    let (port, stub) = spawn_model_stub(vec![
        chat_completion("A summary of page A."),
        chat_completion(
            r#"{"connections":["c1","c2","c3"],"overallSummary":"overall done"}"#,
        ),
    ]);
    write_model_config(
        home.path(),
        &format!("http://127.0.0.1:{}/v1/chat/completions", port),
    );
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let url = "https://example.org/a";

    let response = client.request(
        "start-1",
        Action::StartActivity {
            activity: "research".to_string(),
        },
    );
    assert!(response.ok, "startActivity was not ok");

    let response = client.request(
        "sum-1",
        Action::Summarize {
            content: "page A body".to_string(),
            url: url.to_string(),
        },
    );
    assert!(response.ok, "summarize was not ok");
    let summary = match response.data.expect("summary payload") {
        Reply::UpdateSummary { summary } => summary,
        other => panic!("unexpected reply: {:?}", other),
    };
    assert_eq!(summary, "A summary of page A.");

    // Page memos travel with the endActivity summaries payload.
    let mut summaries = SummaryMap::new();
    summaries.insert(
        url.to_string(),
        PageSummary {
            summary,
            memos: vec!["check citation".to_string()],
        },
    );

    let response = client.request("end-1", Action::EndActivity { summaries });
    assert!(response.ok, "endActivity was not ok");
    match response.data.expect("report payload") {
        Reply::EndActivity { final_report } => {
            assert_eq!(final_report.summaries[url].memos, vec!["check citation"]);
            assert_eq!(final_report.connections, vec!["c1", "c2", "c3"]);
            assert_eq!(final_report.overall_summary, "overall done");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    stub.join().expect("model stub");

    let response = client.request("stats-1", Action::GetActivityStats);
    match response.data.expect("stats payload") {
        Reply::UpdateActivityStats { stats } => {
            assert_eq!(stats.pages_visited, 0);
            assert_eq!(stats.time_spent, "0:00");
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    let response = client.request("report-1", Action::OpenFinalReport);
    assert!(response.ok, "openFinalReport was not ok");
    match response.data.expect("report payload") {
        Reply::ReportOpened { path } => {
            let rendered = Path::new(&path).join("research.html");
            assert!(rendered.exists(), "missing {}", rendered.display());
            let html = std::fs::read_to_string(rendered).expect("read rendered report");
            assert!(html.contains("overall done"));
            assert!(html.contains("check citation"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[test]
fn report_rendering_writes_html_files() {
    let home = TempDir::new().expect("temp HOME");
    let _guard = spawn_daemon(home.path());
    let socket = socket_path(home.path());
    wait_for_socket(&socket, Duration::from_secs(2));

    let mut client = Client::connect(&socket);
    let response = client.request("report-1", Action::OpenFinalReport);

    assert!(response.ok, "openFinalReport was not ok");
    match response.data.expect("report payload") {
        Reply::ReportOpened { path } => {
            assert!(Path::new(&path).is_dir(), "reports dir missing: {}", path);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}
