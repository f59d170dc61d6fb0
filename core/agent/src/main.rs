//! fieldnote-agent: command-line client for the Fieldnote daemon.
//!
//! Each subcommand maps to one daemon action. Page memos are the
//! exception: they live in a local session mirror and are submitted as a
//! batch when the activity ends. `watch` holds a connection open and
//! prints the stats frames the daemon broadcasts.

mod client;
mod logging;
mod session;

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use client::DaemonClient;
use fieldnote_core::{report, StorageConfig, Store};
use fieldnote_daemon_protocol::{Action, Reply};
use session::SessionMirror;

#[derive(Parser)]
#[command(name = "fieldnote-agent")]
#[command(about = "Research-activity tracker client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is alive
    Ping,

    /// Start a research activity (resets current summaries)
    Start {
        /// Activity name
        activity: String,
    },

    /// Summarize a page and record it under the current activity
    Summarize {
        /// Page URL the content came from
        url: String,

        /// Read page content from a file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Mark a snippet on a page as important context
    Mark {
        /// Page URL
        url: String,

        /// The snippet text
        context: String,
    },

    /// Attach a memo to a previously marked context
    Memo {
        /// Page URL the context was marked on
        url: String,

        /// Index of the context on that page (0-based)
        index: usize,

        /// Memo text
        memo: String,
    },

    /// Attach a memo to a page (kept locally until the activity ends)
    Note {
        /// Page URL
        url: String,

        /// Memo text
        memo: String,
    },

    /// End the current activity and synthesize the final report
    End,

    /// Show current activity stats
    Stats,

    /// Render stored final reports to HTML
    Report {
        /// Activity to render; omit to list stored reports
        activity: Option<String>,
    },

    /// Stay connected and print stats broadcasts as they arrive
    Watch,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::Ping => ping(),
        Commands::Start { activity } => start(&activity),
        Commands::Summarize { url, file } => summarize(&url, file),
        Commands::Mark { url, context } => mark(&url, &context),
        Commands::Memo { url, index, memo } => context_memo(&url, index, &memo),
        Commands::Note { url, memo } => page_note(&url, &memo),
        Commands::End => end_activity(),
        Commands::Stats => stats(),
        Commands::Report { activity } => render_report(activity.as_deref()),
        Commands::Watch => watch(),
    }
}

fn ping() -> Result<(), String> {
    let mut client = DaemonClient::connect()?;
    match client.request(Action::Ping)? {
        Reply::Pong {
            status,
            pid,
            version,
            ..
        } => {
            println!("daemon is {} (pid {}, version {})", status, pid, version);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn start(activity: &str) -> Result<(), String> {
    let mut client = DaemonClient::connect_checked()?;
    let reply = client.request(Action::StartActivity {
        activity: activity.to_string(),
    })?;
    match reply {
        Reply::UpdateActivityStatus { activity } => {
            session_mirror()?.clear()?;
            println!("started activity: {}", activity);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn summarize(url: &str, file: Option<PathBuf>) -> Result<(), String> {
    let content = read_content(file)?;
    if content.trim().is_empty() {
        return Err("no page content provided".to_string());
    }

    let mut client = DaemonClient::connect_checked()?;
    let reply = client.request(Action::Summarize {
        content,
        url: url.to_string(),
    })?;
    match reply {
        Reply::UpdateSummary { summary } => {
            session_mirror()?.record_summary(url, &summary)?;
            println!("{}", summary);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn mark(url: &str, context: &str) -> Result<(), String> {
    let mut client = DaemonClient::connect_checked()?;
    let reply = client.request(Action::AppendImportantContext {
        context: context.to_string(),
        url: url.to_string(),
    })?;
    match reply {
        Reply::UpdateImportantContext { context } => {
            println!("marked: {}", context);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn context_memo(url: &str, index: usize, memo: &str) -> Result<(), String> {
    let mut client = DaemonClient::connect_checked()?;
    let reply = client.request(Action::AddContextMemo {
        memo: memo.to_string(),
        url: url.to_string(),
        context_index: index,
    })?;
    match reply {
        Reply::UpdateMemos { memo } => {
            println!("memo added: {}", memo);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn page_note(url: &str, memo: &str) -> Result<(), String> {
    session_mirror()?.add_page_memo(url, memo)?;
    println!("note added to {}", url);
    Ok(())
}

fn end_activity() -> Result<(), String> {
    let mut mirror = session_mirror()?;
    let mut client = DaemonClient::connect_checked()?;
    let reply = client.request(Action::EndActivity {
        summaries: mirror.summaries().clone(),
    })?;
    match reply {
        Reply::EndActivity { final_report } => {
            mirror.clear()?;
            println!("activity ended.");
            println!();
            println!("connections:");
            for connection in &final_report.connections {
                println!("  - {}", connection);
            }
            println!();
            println!("overall summary:");
            println!("  {}", final_report.overall_summary);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

fn stats() -> Result<(), String> {
    let mut client = DaemonClient::connect_checked()?;
    match client.request(Action::GetActivityStats)? {
        Reply::UpdateActivityStats { stats } => {
            print_stats_line(stats.pages_visited, stats.memos_added, &stats.time_spent);
            Ok(())
        }
        other => Err(unexpected_reply(&other)),
    }
}

/// Renders from the store directly, read-only. Works even when the
/// daemon is not running.
fn render_report(activity: Option<&str>) -> Result<(), String> {
    let storage = StorageConfig::default();
    let store = Store::open_read_only(storage.store_file())?;
    let reports = store.final_reports()?;

    let activity = match activity {
        Some(activity) => activity,
        None => {
            if reports.is_empty() {
                println!("no reports stored yet");
            } else {
                for name in reports.keys() {
                    println!("{}", name);
                }
            }
            return Ok(());
        }
    };

    // A missing report is an empty state, not an error.
    let document = match reports.get(activity) {
        Some(final_report) => report::render_report_document(activity, final_report),
        None => report::render_empty_state(activity),
    };
    fs_err::create_dir_all(storage.reports_dir())
        .map_err(|err| format!("Failed to create reports directory: {}", err))?;
    let path = storage
        .reports_dir()
        .join(format!("{}.html", report::file_slug(activity)));
    fs_err::write(&path, document).map_err(|err| format!("Failed to write report: {}", err))?;
    println!("{}", path.display());
    Ok(())
}

fn watch() -> Result<(), String> {
    client::watch_forever(|reply| {
        if let Reply::UpdateActivityStats { stats } = reply {
            print_stats_line(stats.pages_visited, stats.memos_added, &stats.time_spent);
        }
    })
}

fn print_stats_line(pages: u64, memos: u64, time_spent: &str) {
    println!("pages: {}  memos: {}  time: {}", pages, memos, time_spent);
}

fn session_mirror() -> Result<SessionMirror, String> {
    SessionMirror::load(StorageConfig::default().session_file())
}

fn read_content(file: Option<PathBuf>) -> Result<String, String> {
    match file {
        Some(path) => fs_err::read_to_string(&path)
            .map_err(|err| format!("Failed to read {}: {}", path.display(), err)),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .map_err(|err| format!("Failed to read stdin: {}", err))?;
            Ok(content)
        }
    }
}

fn unexpected_reply(reply: &Reply) -> String {
    format!("daemon sent an unexpected reply: {:?}", reply)
}
