//! Request dispatch. One function per wire action, all routed through
//! an exhaustive match so a new action variant cannot silently go
//! unhandled.
//!
//! Model calls never run under the store lock: a slow or hung endpoint
//! must not block other connections.

use fieldnote_daemon_protocol::{
    Action, FinalReport, Reply, Request, Response, SummaryMap, PROTOCOL_VERSION,
};

use crate::llm::{LlmClient, USER_FACING_FAILURE};
use crate::state::SharedState;
use crate::synthesis;

pub fn handle_request(request: Request, state: &SharedState, llm: &LlmClient) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            format!(
                "daemon speaks protocol {}, client sent {}",
                PROTOCOL_VERSION, request.protocol_version
            ),
        );
    }

    let id = request.id;
    match request.action {
        Action::Ping => Response::ok(
            id,
            Reply::pong(std::process::id(), env!("CARGO_PKG_VERSION")),
        ),
        Action::Summarize { content, url } => summarize(id, state, llm, &content, &url),
        Action::StartActivity { activity } => match state.start_activity(&activity) {
            Ok(()) => Response::ok(id, Reply::UpdateActivityStatus { activity }),
            Err(err) => store_error(id, err),
        },
        Action::AppendImportantContext { context, url } => {
            match state.append_important_context(&url, &context) {
                Ok(()) => Response::ok(id, Reply::UpdateImportantContext { context }),
                Err(err) => store_error(id, err),
            }
        }
        Action::AddContextMemo {
            memo,
            url,
            context_index,
        } => match state.add_context_memo(&url, context_index, &memo) {
            Ok(()) => Response::ok(id, Reply::UpdateMemos { memo }),
            Err(info) => Response::error_with_info(id, info),
        },
        Action::EndActivity { summaries } => end_activity(id, state, llm, summaries),
        Action::OpenFinalReport => match state.render_reports() {
            Ok(path) => Response::ok(
                id,
                Reply::ReportOpened {
                    path: path.display().to_string(),
                },
            ),
            Err(err) => store_error(id, err),
        },
        Action::GetActivityStats => Response::ok(
            id,
            Reply::UpdateActivityStats {
                stats: state.stats_snapshot(),
            },
        ),
    }
}

fn summarize(
    id: Option<String>,
    state: &SharedState,
    llm: &LlmClient,
    content: &str,
    url: &str,
) -> Response {
    let summary = match llm.chat(&synthesis::summarize_messages(content)) {
        Ok(summary) => summary,
        Err(err) => {
            tracing::warn!(url, error = %err, "Summarization call failed");
            return Response::error(id, "llm_error", USER_FACING_FAILURE);
        }
    };

    if let Err(err) = state.record_summary(url, &summary) {
        return store_error(id, err);
    }
    Response::ok(id, Reply::UpdateSummary { summary })
}

/// Synthesizes the final report from the summaries the client submitted
/// and the stored important contexts, then closes the activity.
fn end_activity(
    id: Option<String>,
    state: &SharedState,
    llm: &LlmClient,
    summaries: SummaryMap,
) -> Response {
    let activity = match state.current_activity() {
        Ok(Some(activity)) => activity,
        Ok(None) => {
            return Response::error(id, "no_active_activity", "No active activity to end")
        }
        Err(err) => return store_error(id, err),
    };

    let contexts = match state.important_contexts() {
        Ok(contexts) => contexts,
        Err(err) => return store_error(id, err),
    };

    let messages = match synthesis::synthesis_messages(&summaries, &contexts) {
        Ok(messages) => messages,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build synthesis request");
            return Response::error(id, "llm_error", USER_FACING_FAILURE);
        }
    };

    let raw = match llm.chat(&messages) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(activity, error = %err, "Synthesis call failed");
            return Response::error(id, "llm_error", USER_FACING_FAILURE);
        }
    };

    let parsed = match synthesis::parse_synthesis(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(activity, error = %err, "Synthesis reply unusable");
            return Response::error(id, "synthesis_error", USER_FACING_FAILURE);
        }
    };

    let report = FinalReport {
        summaries,
        important_contexts: contexts,
        connections: parsed.connections,
        overall_summary: parsed.overall_summary,
    };

    if let Err(err) = state.finish_activity(&activity, report.clone()) {
        return store_error(id, err);
    }
    Response::ok(id, Reply::EndActivity {
        final_report: report,
    })
}

fn store_error(id: Option<String>, message: String) -> Response {
    tracing::error!(error = %message, "Store operation failed");
    Response::error(id, "store_error", message)
}
