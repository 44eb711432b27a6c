//! Report rendering: a flat text summary or the JSON form of the result tree.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collect::ResultGroup;
use crate::probe::WatchdogResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sort results by test name, the order reports are written in
pub fn sort_by_name(results: &mut [WatchdogResult]) {
    results.sort_by(|a, b| a.test_name.cmp(&b.test_name));
}

/// One line per result: padded name, Pass/Fail, latency in seconds
pub fn render_text<'a, I>(results: I) -> String
where
    I: IntoIterator<Item = &'a WatchdogResult>,
{
    let mut out = String::new();
    for result in results {
        let verdict = if result.success { "Pass" } else { "Fail" };
        // Writing to a String cannot fail
        let _ = writeln!(out, "{:<20} {} {:<12.3}", result.test_name, verdict, result.latency);
    }
    out
}

/// Pretty-printed JSON mirroring the group tree
pub fn render_json(root: &ResultGroup) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(root)?)
}

/// Write the JSON report to `path`, creating parent directories
pub fn write_json(root: &ResultGroup, path: &Path) -> Result<(), ReportError> {
    let rendered = render_json(root)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| ReportError::Write { path: path.to_path_buf(), source })?;
    }

    fs::write(path, rendered).map_err(|source| ReportError::Write { path: path.to_path_buf(), source })
}
