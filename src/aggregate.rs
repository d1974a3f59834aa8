//! Repository-level aggregation.
//!
//! Runs once every generation task has settled. Builds the path-sorted
//! [`RepositorySummary`] from cached and freshly generated summaries, asks the
//! inference service for one data-flow / threat diagram, and writes the
//! repository-level documents. With zero successful files the inference call
//! is skipped and the run is reported as empty.
//!
//! Every run rewrites the whole set: a document this run did not produce is
//! removed so nothing from an earlier run sits next to fresh output.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inference::{generate_with_retry, InferenceClient, RetryPolicy};
use crate::models::{
    DocumentationArtifact, FailureReport, RepositorySummary, TaskFailure, ThreatModelReport,
};
use crate::prompts;

pub const SUMMARY_FILE: &str = "summary.docs.md";
pub const DIAGRAM_FILE: &str = "threat-diagram.mmd";
pub const FAILURES_FILE: &str = "failures.md";
pub const THREAT_MODELS_FILE: &str = "logic-flaws.analysis.md";

/// Repository-level results of a run.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub summary: RepositorySummary,
    /// Raw diagram text, unvalidated. `None` when empty or the call failed.
    pub diagram: Option<String>,
    pub diagram_error: Option<String>,
    /// Present when threat models were requested for the run.
    pub threat_models: Option<ThreatModelReport>,
    pub failures: FailureReport,
}

impl Aggregate {
    /// No file was documented, cached or fresh.
    pub fn is_empty_repository(&self) -> bool {
        self.summary.is_empty()
    }
}

/// Paths of the written repository-level documents.
#[derive(Debug, Clone)]
pub struct AggregateOutputs {
    pub summary: PathBuf,
    pub diagram: Option<PathBuf>,
    pub threat_models: Option<PathBuf>,
    pub failures: PathBuf,
}

/// Build the summary, request the diagram, and collect failures and, when
/// `with_threat_models` is set, the per-file threat models.
pub async fn finalize(
    artifacts: &[DocumentationArtifact],
    failures: Vec<TaskFailure>,
    with_threat_models: bool,
    client: &dyn InferenceClient,
    max_output_tokens: u32,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Aggregate {
    let summary = RepositorySummary::from_pairs(
        artifacts
            .iter()
            .map(|a| (a.relative_path.clone(), a.summary.clone()))
            .collect(),
    );
    let failures = FailureReport::from_failures(failures);
    let threat_models = with_threat_models.then(|| {
        ThreatModelReport::from_pairs(
            artifacts
                .iter()
                .filter_map(|a| {
                    a.threat_model
                        .as_ref()
                        .map(|t| (a.relative_path.clone(), t.clone()))
                })
                .collect(),
        )
    });

    if summary.is_empty() {
        warn!("no file was documented, skipping diagram generation");
        return Aggregate {
            summary,
            diagram: None,
            diagram_error: None,
            threat_models,
            failures,
        };
    }

    let prompt = prompts::diagram_prompt(&summary);
    let (diagram, diagram_error) =
        match generate_with_retry(client, &prompt, max_output_tokens, retry, cancel).await {
            Ok(text) => {
                info!(files = summary.len(), "diagram generated");
                (Some(text), None)
            }
            Err(e) => {
                warn!(error = %e, "diagram generation failed");
                (None, Some(e.to_string()))
            }
        };

    Aggregate {
        summary,
        diagram,
        diagram_error,
        threat_models,
        failures,
    }
}

/// Write `content` to `path`, or remove a leftover file when there is none.
fn write_or_remove(path: PathBuf, content: Option<String>) -> std::io::Result<Option<PathBuf>> {
    match content {
        Some(text) => {
            std::fs::write(&path, text)?;
            Ok(Some(path))
        }
        None => match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale output");
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        },
    }
}

/// Write the repository-level documents under `output_dir`.
pub fn write_outputs(output_dir: &Path, aggregate: &Aggregate) -> std::io::Result<AggregateOutputs> {
    std::fs::create_dir_all(output_dir)?;

    let summary = output_dir.join(SUMMARY_FILE);
    std::fs::write(&summary, aggregate.summary.to_markdown())?;

    let diagram = write_or_remove(output_dir.join(DIAGRAM_FILE), aggregate.diagram.clone())?;
    let threat_models = write_or_remove(
        output_dir.join(THREAT_MODELS_FILE),
        aggregate.threat_models.as_ref().map(ThreatModelReport::to_markdown),
    )?;

    let failures = output_dir.join(FAILURES_FILE);
    std::fs::write(&failures, aggregate.failures.to_markdown())?;

    Ok(AggregateOutputs {
        summary,
        diagram,
        threat_models,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::languages::LanguageId;
    use crate::models::FailureReason;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceClient for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }

        async fn generate(&self, prompt: &str, _max: u32) -> Result<String, InferenceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("flowchart TD\n  A --> B".to_string())
        }
    }

    fn artifact(path: &str, summary: &str) -> DocumentationArtifact {
        DocumentationArtifact {
            relative_path: path.to_string(),
            language: LanguageId::Rust,
            documentation: String::new(),
            summary: summary.to_string(),
            threat_model: None,
        }
    }

    #[tokio::test]
    async fn empty_set_skips_inference() {
        let client = Recorder::default();
        let aggregate = finalize(
            &[],
            vec![TaskFailure::new("a.rs", FailureReason::Unreadable, "denied")],
            false,
            &client,
            100,
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(aggregate.is_empty_repository());
        assert!(aggregate.diagram.is_none());
        assert_eq!(aggregate.failures.len(), 1);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_is_deterministic() {
        let client = Recorder::default();
        let forward = vec![artifact("a.rs", "A"), artifact("b.rs", "B"), artifact("c.rs", "C")];
        let mut backward = forward.clone();
        backward.reverse();

        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let one = finalize(&forward, vec![], false, &client, 100, &policy, &cancel).await;
        let two = finalize(&backward, vec![], false, &client, 100, &policy, &cancel).await;
        assert_eq!(one.summary, two.summary);
        assert_eq!(one.summary.entries[0].0, "a.rs");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], prompts[1]);
        assert_eq!(one.diagram.as_deref(), Some("flowchart TD\n  A --> B"));
    }

    #[test]
    fn writes_repository_documents() {
        let out = TempDir::new().unwrap();
        let aggregate = Aggregate {
            summary: RepositorySummary::from_pairs(vec![("a.rs".into(), "Alpha".into())]),
            diagram: Some("flowchart TD".into()),
            diagram_error: None,
            threat_models: None,
            failures: FailureReport::default(),
        };
        let outputs = write_outputs(out.path(), &aggregate).unwrap();
        let summary = std::fs::read_to_string(outputs.summary).unwrap();
        assert!(summary.contains("- **a.rs**: Alpha"));
        assert_eq!(
            std::fs::read_to_string(outputs.diagram.unwrap()).unwrap(),
            "flowchart TD"
        );
        assert!(std::fs::read_to_string(outputs.failures)
            .unwrap()
            .contains("No failures."));
    }

    #[test]
    fn stale_diagram_and_threat_report_are_removed() {
        let out = TempDir::new().unwrap();
        let mut aggregate = Aggregate {
            summary: RepositorySummary::from_pairs(vec![("a.rs".into(), "Alpha".into())]),
            diagram: Some("flowchart TD".into()),
            diagram_error: None,
            threat_models: Some(ThreatModelReport::from_pairs(vec![(
                "a.rs".into(),
                "Unchecked path join.".into(),
            )])),
            failures: FailureReport::default(),
        };
        let first = write_outputs(out.path(), &aggregate).unwrap();
        let report = std::fs::read_to_string(first.threat_models.unwrap()).unwrap();
        assert!(report.contains("## a.rs"));

        aggregate.diagram = None;
        aggregate.diagram_error = Some("bad request".into());
        aggregate.threat_models = None;
        let second = write_outputs(out.path(), &aggregate).unwrap();
        assert!(second.diagram.is_none());
        assert!(second.threat_models.is_none());
        assert!(!out.path().join(DIAGRAM_FILE).exists());
        assert!(!out.path().join(THREAT_MODELS_FILE).exists());
    }

    #[tokio::test]
    async fn threat_models_collected_when_requested() {
        let client = Recorder::default();
        let mut with_model = artifact("b.rs", "B");
        with_model.threat_model = Some("Token reuse.".into());
        let artifacts = vec![artifact("a.rs", "A"), with_model];

        let aggregate = finalize(
            &artifacts,
            vec![],
            true,
            &client,
            100,
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;
        let report = aggregate.threat_models.unwrap();
        assert_eq!(report.entries, vec![("b.rs".to_string(), "Token reuse.".to_string())]);
    }
}
