//! Static HTML rendering for final reports.
//!
//! Every interpolated field comes from page-derived text and must pass
//! through `escape_html` before insertion. This holds for URLs, summaries,
//! connections, context snippets, and memos alike; there is no trusted
//! string in a report.

use std::fmt::Write;

use fieldnote_daemon_protocol::{ContextEntry, FinalReport};

/// Escapes the five HTML-significant characters. Ampersand is replaced
/// first so already-escaped entities do not get double-mangled.
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}

/// Renders one activity's final report as a complete HTML document.
pub fn render_report_document(activity: &str, report: &FinalReport) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<section class=\"report-section\">\n<h2>Overall Summary</h2>\n<p>{}</p>\n</section>\n",
        escape_html(&report.overall_summary)
    );

    body.push_str("<section class=\"report-section\">\n<h2>Connections</h2>\n<ul class=\"connection-list\">\n");
    for connection in &report.connections {
        let _ = write!(body, "<li>{}</li>\n", escape_html(connection));
    }
    body.push_str("</ul>\n</section>\n");

    body.push_str("<section class=\"report-section\">\n<h2>Page Summaries</h2>\n");
    for (url, page) in &report.summaries {
        let escaped_url = escape_html(url);
        let _ = write!(
            body,
            "<div class=\"summary-card\">\n<h3><a href=\"{}\">{}</a></h3>\n<p>{}</p>\n",
            escaped_url,
            escaped_url,
            escape_html(&page.summary)
        );
        if let Some(contexts) = report.important_contexts.get(url) {
            body.push_str(&render_contexts(contexts));
        }
        body.push_str(&render_memos(&page.memos));
        body.push_str("</div>\n");
    }
    body.push_str("</section>\n");

    wrap_document(activity, &body)
}

/// Activity names come from users; keep report filenames to a safe
/// alphabet.
pub fn file_slug(activity: &str) -> String {
    let slug: String = activity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}

/// Rendered when no report exists for the requested activity. An absent
/// report is an empty state, not an error.
pub fn render_empty_state(activity: &str) -> String {
    let body = format!(
        "<p class=\"empty-state\">No report data available for activity \"{}\".</p>\n",
        escape_html(activity)
    );
    wrap_document(activity, &body)
}

fn render_contexts(contexts: &[ContextEntry]) -> String {
    if contexts.is_empty() {
        return String::new();
    }
    let mut out = String::from("<h4>Important Context:</h4>\n<ul class=\"important-context-list\">\n");
    for context in contexts {
        let _ = write!(out, "<li>{}\n", escape_html(&context.text));
        out.push_str(&render_memos(&context.memos));
        out.push_str("</li>\n");
    }
    out.push_str("</ul>\n");
    out
}

fn render_memos(memos: &[String]) -> String {
    if memos.is_empty() {
        return String::new();
    }
    let mut out = String::from("<h4>Memos:</h4>\n<ul class=\"memo-list\">\n");
    for memo in memos {
        let _ = write!(out, "<li>{}</li>\n", escape_html(memo));
    }
    out.push_str("</ul>\n");
    out
}

fn wrap_document(activity: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Fieldnote Report: {}</title>\n</head>\n<body>\n<h1>{}</h1>\n{}</body>\n</html>\n",
        escape_html(activity),
        escape_html(activity),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldnote_daemon_protocol::{PageSummary, SummaryMap};
    use std::collections::BTreeMap;

    fn report_with_page(url: &str, page: PageSummary) -> FinalReport {
        let mut summaries = SummaryMap::new();
        summaries.insert(url.to_string(), page);
        FinalReport {
            summaries,
            important_contexts: BTreeMap::new(),
            connections: vec!["first connection".to_string()],
            overall_summary: "overall".to_string(),
        }
    }

    #[test]
    fn escapes_all_significant_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn ampersand_escaped_before_other_entities() {
        assert_eq!(escape_html("<"), "&lt;");
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
    }

    #[test]
    fn script_in_summary_renders_inert() {
        let report = report_with_page(
            "https://a",
            PageSummary {
                summary: "<script>alert(1)</script>".to_string(),
                memos: vec![],
            },
        );
        let html = render_report_document("research", &report);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn script_in_memo_and_context_renders_inert() {
        let mut report = report_with_page(
            "https://a",
            PageSummary {
                summary: "s".to_string(),
                memos: vec!["<script>m</script>".to_string()],
            },
        );
        report.important_contexts.insert(
            "https://a".to_string(),
            vec![ContextEntry {
                text: "<script>c</script>".to_string(),
                memos: vec!["<script>cm</script>".to_string()],
            }],
        );
        let html = render_report_document("research", &report);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;m&lt;/script&gt;"));
        assert!(html.contains("&lt;script&gt;c&lt;/script&gt;"));
        assert!(html.contains("&lt;script&gt;cm&lt;/script&gt;"));
    }

    #[test]
    fn nested_context_memos_appear_under_their_entry() {
        let mut report = report_with_page(
            "https://a",
            PageSummary {
                summary: "s".to_string(),
                memos: vec!["page memo".to_string()],
            },
        );
        report.important_contexts.insert(
            "https://a".to_string(),
            vec![ContextEntry {
                text: "snippet".to_string(),
                memos: vec!["context memo".to_string()],
            }],
        );
        let html = render_report_document("research", &report);
        assert!(html.contains("snippet"));
        assert!(html.contains("context memo"));
        assert!(html.contains("page memo"));
        let snippet_at = html.find("snippet").unwrap();
        let context_memo_at = html.find("context memo").unwrap();
        assert!(snippet_at < context_memo_at);
    }

    #[test]
    fn empty_state_mentions_activity_and_escapes_it() {
        let html = render_empty_state("<research>");
        assert!(html.contains("No report data available"));
        assert!(html.contains("&lt;research&gt;"));
        assert!(!html.contains("<research>"));
    }

    #[test]
    fn slugs_stay_filesystem_safe() {
        assert_eq!(file_slug("Research Trip/2026"), "research-trip-2026");
        assert_eq!(file_slug("../../etc/passwd"), "------etc-passwd");
        assert_eq!(file_slug(""), "report");
    }

    #[test]
    fn connections_render_as_list_items() {
        let report = report_with_page(
            "https://a",
            PageSummary {
                summary: "s".to_string(),
                memos: vec![],
            },
        );
        let html = render_report_document("research", &report);
        assert!(html.contains("<li>first connection</li>"));
    }
}
