//! Prompt construction and model-output parsing for summaries and
//! end-of-activity synthesis.
//!
//! The synthesis parser is deliberately defensive: a reply that is not
//! JSON at all is an error, but a JSON reply with a missing or
//! wrong-typed field falls back to fixed placeholder values instead of
//! failing the whole operation.

use serde_json::{json, Value};

use fieldnote_core::store::ContextMap;
use fieldnote_daemon_protocol::{SummaryMap, SUMMARY_CONTENT_MAX_CHARS};

use crate::llm::ChatMessage;

const SUMMARIZE_PROMPT: &str =
    "Summarize the following content in 2-3 sentences. Focus on the main idea of the content.";

const SYNTHESIS_PROMPT: &str = "Analyze the following documents, their important contexts, and \
     memos to provide 3 connections between them, as well as an overall summary of the activity. \
     Provide your response in JSON format with 'connections' as an array of 3 strings and \
     'overallSummary' as a string.";

pub const FALLBACK_CONNECTION: &str = "No connections generated";
pub const FALLBACK_OVERALL_SUMMARY: &str = "No overall summary generated";

#[derive(Debug, PartialEq, Eq)]
pub struct Synthesis {
    pub connections: Vec<String>,
    pub overall_summary: String,
}

/// Bounds page content to a fixed prefix before submission. The marker
/// tells downstream consumers the content was cut.
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(SUMMARY_CONTENT_MAX_CHARS) {
        Some((byte_index, _)) => format!("{}...", &content[..byte_index]),
        None => content.to_string(),
    }
}

pub fn summarize_messages(content: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARIZE_PROMPT),
        ChatMessage::user(truncate_content(content)),
    ]
}

pub fn synthesis_messages(
    summaries: &SummaryMap,
    contexts: &ContextMap,
) -> Result<Vec<ChatMessage>, String> {
    let payload = json!({
        "summaries": summaries,
        "importantContexts": contexts,
    });
    let serialized = serde_json::to_string(&payload)
        .map_err(|err| format!("Failed to serialize synthesis payload: {}", err))?;
    Ok(vec![
        ChatMessage::system(SYNTHESIS_PROMPT),
        ChatMessage::user(serialized),
    ])
}

/// Parses the model's synthesis reply, substituting placeholders for a
/// wrong shape rather than failing.
pub fn parse_synthesis(raw: &str) -> Result<Synthesis, String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| format!("model output was not valid JSON: {}", err))?;

    let connections = match value.get("connections") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => vec![FALLBACK_CONNECTION.to_string()],
    };

    let overall_summary = value
        .get("overallSummary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_OVERALL_SUMMARY.to_string());

    Ok(Synthesis {
        connections,
        overall_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldnote_daemon_protocol::PageSummary;

    #[test]
    fn short_content_passes_through_unmarked() {
        assert_eq!(truncate_content("short text"), "short text");
    }

    #[test]
    fn long_content_is_cut_with_marker() {
        let content = "x".repeat(SUMMARY_CONTENT_MAX_CHARS + 100);
        let truncated = truncate_content(&content);
        assert_eq!(truncated.chars().count(), SUMMARY_CONTENT_MAX_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let content = "é".repeat(SUMMARY_CONTENT_MAX_CHARS + 10);
        let truncated = truncate_content(&content);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), SUMMARY_CONTENT_MAX_CHARS + 3);
    }

    #[test]
    fn summarize_messages_carry_system_then_user() {
        let messages = summarize_messages("page body");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "page body");
    }

    #[test]
    fn synthesis_payload_embeds_both_mappings() {
        let mut summaries = SummaryMap::new();
        summaries.insert(
            "https://a".to_string(),
            PageSummary {
                summary: "s".to_string(),
                memos: vec![],
            },
        );
        let messages = synthesis_messages(&summaries, &ContextMap::new()).unwrap();
        assert!(messages[1].content.contains("\"summaries\""));
        assert!(messages[1].content.contains("\"importantContexts\""));
        assert!(messages[1].content.contains("https://a"));
    }

    #[test]
    fn well_formed_reply_parses() {
        let parsed = parse_synthesis(
            r#"{"connections":["a","b","c"],"overallSummary":"done"}"#,
        )
        .unwrap();
        assert_eq!(parsed.connections, vec!["a", "b", "c"]);
        assert_eq!(parsed.overall_summary, "done");
    }

    #[test]
    fn missing_connections_falls_back() {
        let parsed = parse_synthesis(r#"{"overallSummary":"done"}"#).unwrap();
        assert_eq!(parsed.connections, vec![FALLBACK_CONNECTION]);
        assert_eq!(parsed.overall_summary, "done");
    }

    #[test]
    fn non_array_connections_falls_back() {
        let parsed =
            parse_synthesis(r#"{"connections":"not a list","overallSummary":"done"}"#).unwrap();
        assert_eq!(parsed.connections, vec![FALLBACK_CONNECTION]);
    }

    #[test]
    fn non_string_overall_summary_falls_back() {
        let parsed = parse_synthesis(r#"{"connections":["a"],"overallSummary":42}"#).unwrap();
        assert_eq!(parsed.overall_summary, FALLBACK_OVERALL_SUMMARY);
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(parse_synthesis("Sure! Here are the connections:").is_err());
    }

    #[test]
    fn non_string_connection_elements_are_stringified() {
        let parsed = parse_synthesis(r#"{"connections":[1,"two"],"overallSummary":"s"}"#).unwrap();
        assert_eq!(parsed.connections, vec!["1", "two"]);
    }
}
