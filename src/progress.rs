//! Run progress reporting.
//!
//! Reports observable progress during `wraith run` so users see what is being
//! scanned, how many files are left, and when aggregation starts.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Walking the repository. Total unknown.
    Discovering { repo: String },
    /// Candidates split into changed and cached files.
    Planned { changed: u64, unchanged: u64 },
    /// `n` of `total` changed files have settled.
    Generating { n: u64, total: u64 },
    /// Building the repository summary and diagram.
    Aggregating { files: u64 },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "wraith  generating  12 / 1,340 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { repo } => format!("wraith {}  discovering...\n", repo),
            ProgressEvent::Planned { changed, unchanged } => format!(
                "wraith  {} changed, {} cached\n",
                format_number(*changed),
                format_number(*unchanged)
            ),
            ProgressEvent::Generating { n, total } => format!(
                "wraith  generating  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Aggregating { files } => {
                format!("wraith  aggregating {} summaries\n", format_number(*files))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { repo } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "repo": repo
            }),
            ProgressEvent::Planned { changed, unchanged } => serde_json::json!({
                "event": "progress",
                "phase": "planned",
                "changed": changed,
                "unchanged": unchanged
            }),
            ProgressEvent::Generating { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "generating",
                "n": n,
                "total": total
            }),
            ProgressEvent::Aggregating { files } => serde_json::json!({
                "event": "progress",
                "phase": "aggregating",
                "files": files
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
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
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
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
}
