//! IPC protocol types and validation for fieldnote-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema
//! drift. The daemon remains the authority on validation, but clients can
//! reuse the same types to construct valid requests.
//!
//! Frames are newline-delimited JSON. Requests carry a closed `Action`
//! enum tagged by the `action` field; replies mirror the action tags the
//! original sidebar protocol used (`updateSummary`, `updateMemos`, ...).
//! A response always carries either `data` or `error`, never both. Frames
//! with no `id` are unsolicited broadcasts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod records;

pub use records::{ActivityStats, ContextEntry, FinalReport, PageSummary, SummaryMap};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

/// Prefix length applied to page content before summarization.
pub const SUMMARY_CONTENT_MAX_CHARS: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    Ping,
    #[serde(rename_all = "camelCase")]
    Summarize { content: String, url: String },
    #[serde(rename_all = "camelCase")]
    StartActivity { activity: String },
    #[serde(rename_all = "camelCase")]
    AppendImportantContext { context: String, url: String },
    #[serde(rename_all = "camelCase")]
    AddContextMemo {
        memo: String,
        url: String,
        context_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    EndActivity { summaries: SummaryMap },
    OpenFinalReport,
    GetActivityStats,
}

impl Action {
    /// Tag names accepted on the wire, used to tell an unknown action
    /// apart from a malformed known one.
    pub const KNOWN_TAGS: &'static [&'static str] = &[
        "ping",
        "summarize",
        "startActivity",
        "appendImportantContext",
        "addContextMemo",
        "endActivity",
        "openFinalReport",
        "getActivityStats",
    ];

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            Action::Summarize { url, .. } => require_non_empty(url, "url"),
            Action::StartActivity { activity } => require_non_empty(activity, "activity"),
            Action::AppendImportantContext { context, url } => {
                require_non_empty(context, "context")?;
                require_non_empty(url, "url")
            }
            Action::AddContextMemo { memo, url, .. } => {
                require_non_empty(memo, "memo")?;
                require_non_empty(url, "url")
            }
            Action::Ping
            | Action::EndActivity { .. }
            | Action::OpenFinalReport
            | Action::GetActivityStats => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub protocol_version: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

impl Request {
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            id: Some(id.into()),
            action,
        }
    }
}

/// Parses and validates one request frame.
///
/// Unknown action tags are reported as `unknown_action` rather than a
/// generic parse failure so clients get an actionable error.
pub fn parse_request(bytes: &[u8]) -> Result<Request, ErrorInfo> {
    let value: Value = serde_json::from_slice(bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })?;

    if let Some(tag) = value.get("action").and_then(|v| v.as_str()) {
        if !Action::KNOWN_TAGS.contains(&tag) {
            return Err(ErrorInfo::new(
                "unknown_action",
                format!("Unknown action: {}", tag),
            ));
        }
    }

    let request: Request = serde_json::from_value(value)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("request is invalid: {}", err)))?;
    request.action.validate()?;
    Ok(request)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Reply {
    #[serde(rename_all = "camelCase")]
    Pong {
        status: String,
        pid: u32,
        version: String,
        protocol_version: u32,
    },
    #[serde(rename_all = "camelCase")]
    UpdateSummary { summary: String },
    #[serde(rename_all = "camelCase")]
    UpdateActivityStatus { activity: String },
    #[serde(rename_all = "camelCase")]
    UpdateImportantContext { context: String },
    #[serde(rename_all = "camelCase")]
    UpdateMemos { memo: String },
    #[serde(rename_all = "camelCase")]
    EndActivity { final_report: FinalReport },
    #[serde(rename_all = "camelCase")]
    ReportOpened { path: String },
    #[serde(rename_all = "camelCase")]
    UpdateActivityStats { stats: ActivityStats },
}

impl Reply {
    pub fn pong(pid: u32, version: &str) -> Self {
        Reply::Pong {
            status: "alive".to_string(),
            pid,
            version: version.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Reply) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }

    /// Unsolicited stats frame pushed to every open connection.
    pub fn broadcast(stats: ActivityStats) -> Self {
        Self {
            ok: true,
            id: None,
            data: Some(Reply::UpdateActivityStats { stats }),
            error: None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.id.is_none() && self.ok
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}
