//! Core data models used throughout Wraith.
//!
//! These types represent the files, artifacts, and failures that flow
//! through the documentation pipeline, from the repository walk to the
//! repository-level report.

use std::fmt;
use std::path::PathBuf;

use crate::languages::LanguageId;

/// A source file selected by the walk and filter steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Repository-relative path with `/` separators.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub language: LanguageId,
    pub size_bytes: u64,
}

/// Generated documentation for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentationArtifact {
    pub relative_path: String,
    pub language: LanguageId,
    /// Full markdown documentation as returned by the inference service.
    pub documentation: String,
    /// Condensed summary used in the repository overview.
    pub summary: String,
    /// Attacker-perspective analysis, present when threat models are enabled.
    pub threat_model: Option<String>,
}

/// Why a file could not be documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The file could not be read.
    Unreadable,
    /// Inference failed permanently or retries were exhausted.
    GenerationFailed,
    /// Generation succeeded but the artifact or cache entry could not be written.
    CommitFailed,
    /// The run was cancelled before the file finished.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Unreadable => "unreadable",
            FailureReason::GenerationFailed => "generation failed",
            FailureReason::CommitFailed => "commit failed",
            FailureReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A recorded, non-fatal failure for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub relative_path: String,
    pub reason: FailureReason,
    pub detail: String,
}

impl TaskFailure {
    pub fn new(relative_path: &str, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            reason,
            detail: detail.into(),
        }
    }
}

/// Outcome of a single per-file generation task.
pub type TaskOutcome = Result<DocumentationArtifact, TaskFailure>;

/// Ordered `(path, summary)` pairs for every documented file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySummary {
    pub entries: Vec<(String, String)>,
}

impl RepositorySummary {
    /// Build a summary sorted by path so repeated runs render identically.
    pub fn from_pairs(mut entries: Vec<(String, String)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as the `summary.docs.md` markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Repository Overview\n\n");
        for (path, summary) in &self.entries {
            let one_line = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            out.push_str(&format!("- **{}**: {}\n", path, one_line));
        }
        out
    }
}

/// Per-file threat models, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreatModelReport {
    pub entries: Vec<(String, String)>,
}

impl ThreatModelReport {
    /// Keep non-blank models only, ordered by path.
    pub fn from_pairs(entries: Vec<(String, String)>) -> Self {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as the `logic-flaws.analysis.md` document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Logic Flaw Analysis\n");
        if self.entries.is_empty() {
            out.push_str("\nNo threat models were produced.\n");
            return out;
        }
        for (path, text) in &self.entries {
            out.push_str(&format!("\n## {}\n\n{}\n", path, text.trim()));
        }
        out
    }
}

/// Failures collected over a run, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    pub failures: Vec<TaskFailure>,
}

impl FailureReport {
    pub fn from_failures(mut failures: Vec<TaskFailure>) -> Self {
        failures.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Failed Files\n\n");
        if self.failures.is_empty() {
            out.push_str("No failures.\n");
            return out;
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "- **{}** ({}): {}\n",
                failure.relative_path, failure.reason, failure.detail
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_report_skips_blank_models() {
        let report = ThreatModelReport::from_pairs(vec![
            ("b.py".to_string(), "SQL built from request args.".to_string()),
            ("a.py".to_string(), "  \n".to_string()),
        ]);
        assert_eq!(report.len(), 1);
        let markdown = report.to_markdown();
        assert!(markdown.starts_with("# Logic Flaw Analysis\n"));
        assert!(markdown.contains("## b.py\n\nSQL built from request args.\n"));
        assert!(!markdown.contains("a.py"));
    }

    #[test]
    fn summary_sorted_and_deduplicated() {
        let summary = RepositorySummary::from_pairs(vec![
            ("src/b.py".to_string(), "B".to_string()),
            ("src/a.py".to_string(), "A".to_string()),
            ("src/b.py".to_string(), "B again".to_string()),
        ]);
        let paths: Vec<&str> = summary.entries.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn summary_markdown_collapses_whitespace() {
        let summary = RepositorySummary::from_pairs(vec![(
            "main.go".to_string(),
            "Starts the\n  server.".to_string(),
        )]);
        assert_eq!(
            summary.to_markdown(),
            "# Repository Overview\n\n- **main.go**: Starts the server.\n"
        );
    }

    #[test]
    fn failure_report_lists_reason() {
        let report = FailureReport::from_failures(vec![TaskFailure::new(
            "x.rs",
            FailureReason::GenerationFailed,
            "rate limited",
        )]);
        assert!(report
            .to_markdown()
            .contains("- **x.rs** (generation failed): rate limited"));
    }
}
