//! Ingestion progress reporting.
//!
//! Reports observable progress during admission so users see what file is
//! being processed, how much is left, and when ingestion finishes.
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.
//!
//! Five events cover a run end to end: `{started, file_begin,
//! file_done(category), progress(n/total), finished}`.

use std::io::Write;

/// One structured ingestion event (spec.md §4.10).
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Started { run_id: String, total_files: usize },
    FileBegin { path: String },
    FileDone { path: String, category: String },
    Progress { completed: usize, total: usize },
    Finished { completed: usize, failed: usize },
}

/// Reports ingestion progress. Implementations write to stderr (human or
/// JSON) or discard events entirely.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { run_id, total_files } => {
                format!("ingest {run_id}  started  {} files\n", format_number(*total_files as u64))
            }
            ProgressEvent::FileBegin { path } => format!("ingest  {path} ...\n"),
            ProgressEvent::FileDone { path, category } => format!("ingest  {path}  {category}\n"),
            ProgressEvent::Progress { completed, total } => format!(
                "ingest  {} / {} files\n",
                format_number(*completed as u64),
                format_number(*total as u64)
            ),
            ProgressEvent::Finished { completed, failed } => {
                format!("ingest  finished  {completed} completed, {failed} failed\n")
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { run_id, total_files } => serde_json::json!({
                "event": "started",
                "run_id": run_id,
                "total_files": total_files,
            }),
            ProgressEvent::FileBegin { path } => serde_json::json!({
                "event": "file_begin",
                "path": path,
            }),
            ProgressEvent::FileDone { path, category } => serde_json::json!({
                "event": "file_done",
                "path": path,
                "category": category,
            }),
            ProgressEvent::Progress { completed, total } => serde_json::json!({
                "event": "progress",
                "completed": completed,
                "total": total,
            }),
            ProgressEvent::Finished { completed, failed } => serde_json::json!({
                "event": "finished",
                "completed": completed,
                "failed": failed,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{line}");
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled, and the default for library
/// callers that drive ingestion programmatically.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len().saturating_sub(1)) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    /// Uses the stable `std::io::IsTerminal` check rather than a
    /// dedicated crate, since the standard library has carried this
    /// natively since 1.70.
    pub fn default_for_tty() -> Self {
        use std::io::IsTerminal;
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn no_progress_does_not_panic() {
        NoProgress.report(ProgressEvent::Started {
            run_id: "r1".to_string(),
            total_files: 3,
        });
    }
}
