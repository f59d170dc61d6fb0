//! Renders stored final reports to static HTML files.

use std::path::{Path, PathBuf};

use fieldnote_core::report::{file_slug, render_report_document};
use fieldnote_core::Store;

/// Writes one HTML document per stored report into `reports_dir` and
/// returns the directory. Reports for reused activity names overwrite
/// their previous file.
pub fn render_all(store: &Store, reports_dir: &Path) -> Result<PathBuf, String> {
    let reports = store.final_reports()?;
    fs_err::create_dir_all(reports_dir)
        .map_err(|err| format!("Failed to create reports directory: {}", err))?;

    for (activity, report) in &reports {
        let document = render_report_document(activity, report);
        let path = reports_dir.join(format!("{}.html", file_slug(activity)));
        fs_err::write(&path, document)
            .map_err(|err| format!("Failed to write report {}: {}", path.display(), err))?;
        tracing::debug!(activity, path = %path.display(), "Report rendered");
    }

    Ok(reports_dir.to_path_buf())
}
