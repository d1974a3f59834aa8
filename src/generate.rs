//! Generation orchestrator.
//!
//! Fans the changed files out to a bounded pool of tokio tasks and fans the
//! results back in. Each task reads its file, truncates it, asks the
//! inference service for documentation and then for a summary of that
//! documentation, optionally for a threat model, and commits the artifact and
//! cache entry on the blocking pool. Every task yields exactly one
//! [`TaskOutcome`]; a failing file never affects the others.
//!
//! The degree of parallelism is a semaphore bound. Cancellation is observed
//! before a task acquires its permit and while it waits on the service; a
//! cancelled task commits nothing.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, ChangedFile};
use crate::fingerprint::{fingerprint_bytes, SamplingPolicy};
use crate::inference::{generate_with_retry, GenerationError, InferenceClient, RetryPolicy};
use crate::languages::LanguageRegistry;
use crate::models::{
    DocumentationArtifact, FailureReason, FileCandidate, TaskFailure, TaskOutcome,
};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompts;
use crate::truncate::truncate;

/// Per-run knobs for the generation tasks.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub budget_tokens: usize,
    pub concurrency: usize,
    pub max_output_tokens: u32,
    pub summary_max_output_tokens: u32,
    /// Request a per-file threat model after the summary.
    pub threat_model: bool,
    pub retry: RetryPolicy,
    pub sampling: SamplingPolicy,
}

/// Shared, read-only state handed to every task.
#[derive(Clone)]
pub struct GenerationContext {
    pub registry: Arc<LanguageRegistry>,
    pub cache: Arc<CacheStore>,
    pub client: Arc<dyn InferenceClient>,
    pub settings: GenerationSettings,
    pub cancel: CancellationToken,
}

/// Process every changed file and return one outcome per file.
///
/// Returns only after every task has settled. Outcomes are in completion
/// order, not input order.
pub async fn run(
    changed: Vec<ChangedFile>,
    ctx: &GenerationContext,
    progress: &dyn ProgressReporter,
) -> Vec<TaskOutcome> {
    let total = changed.len() as u64;
    let semaphore = Arc::new(Semaphore::new(ctx.settings.concurrency.max(1)));
    let mut expected: HashSet<String> = HashSet::with_capacity(changed.len());
    let mut tasks = JoinSet::new();

    for file in changed {
        debug!(path = %file.candidate.relative_path, cause = ?file.cause, "scheduling");
        expected.insert(file.candidate.relative_path.clone());
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let candidate = file.candidate;
            let _permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return Err(TaskFailure::new(
                        &candidate.relative_path,
                        FailureReason::Cancelled,
                        "run cancelled before start",
                    ));
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(TaskFailure::new(
                            &candidate.relative_path,
                            FailureReason::Cancelled,
                            "worker pool closed",
                        ));
                    }
                },
            };
            process_file(&candidate, &ctx).await
        });
    }

    let mut outcomes = Vec::with_capacity(expected.len());
    let mut settled = 0u64;
    while let Some(joined) = tasks.join_next().await {
        settled += 1;
        progress.report(ProgressEvent::Generating { n: settled, total });
        match joined {
            Ok(outcome) => {
                let path = match &outcome {
                    Ok(artifact) => &artifact.relative_path,
                    Err(failure) => &failure.relative_path,
                };
                expected.remove(path);
                outcomes.push(outcome);
            }
            Err(e) => warn!(error = %e, "generation task aborted"),
        }
    }

    // A task that panicked produced no outcome; report it rather than drop it.
    let mut orphans: Vec<String> = expected.into_iter().collect();
    orphans.sort();
    for path in orphans {
        outcomes.push(Err(TaskFailure::new(
            &path,
            FailureReason::GenerationFailed,
            "generation task aborted",
        )));
    }

    outcomes
}

/// Read, truncate, document, summarize, and commit one file.
async fn process_file(candidate: &FileCandidate, ctx: &GenerationContext) -> TaskOutcome {
    let path = candidate.relative_path.as_str();
    let fail = |reason: FailureReason, detail: String| {
        warn!(path, %reason, detail = %detail, "file failed");
        TaskFailure::new(path, reason, detail)
    };

    let bytes = tokio::fs::read(&candidate.absolute_path)
        .await
        .map_err(|e| fail(FailureReason::Unreadable, e.to_string()))?;
    let fingerprint = fingerprint_bytes(&bytes, &ctx.settings.sampling);
    let content = String::from_utf8(bytes)
        .map_err(|_| fail(FailureReason::Unreadable, "not valid UTF-8".to_string()))?;

    let profile = ctx.registry.get(candidate.language).ok_or_else(|| {
        fail(
            FailureReason::GenerationFailed,
            format!("language '{}' is not enabled", candidate.language),
        )
    })?;

    let truncation = truncate(&content, ctx.settings.budget_tokens, profile);
    if truncation.was_truncated {
        debug!(path, strategy = ?truncation.strategy, "truncated to budget");
    }

    let generation_failure = |e: GenerationError| match e {
        GenerationError::Cancelled => fail(FailureReason::Cancelled, "run cancelled".to_string()),
        other => fail(FailureReason::GenerationFailed, other.to_string()),
    };

    let doc_prompt = prompts::documentation_prompt(
        path,
        candidate.language,
        &truncation.excerpt,
        truncation.was_truncated,
    );
    let documentation = generate_with_retry(
        ctx.client.as_ref(),
        &doc_prompt,
        ctx.settings.max_output_tokens,
        &ctx.settings.retry,
        &ctx.cancel,
    )
    .await
    .map_err(generation_failure)?;
    if documentation.trim().is_empty() {
        return Err(fail(
            FailureReason::GenerationFailed,
            "inference returned empty documentation".to_string(),
        ));
    }

    let summary = generate_with_retry(
        ctx.client.as_ref(),
        &prompts::summary_prompt(path, &documentation),
        ctx.settings.summary_max_output_tokens,
        &ctx.settings.retry,
        &ctx.cancel,
    )
    .await
    .map_err(generation_failure)?;
    let summary = match summary.trim() {
        "" => prompts::first_paragraph(&documentation),
        s => s.to_string(),
    };

    let threat_model = if ctx.settings.threat_model {
        let text = generate_with_retry(
            ctx.client.as_ref(),
            &prompts::threat_model_prompt(path, candidate.language, &documentation),
            ctx.settings.max_output_tokens,
            &ctx.settings.retry,
            &ctx.cancel,
        )
        .await
        .map_err(generation_failure)?;
        Some(text.trim().to_string())
    } else {
        None
    };

    let artifact = DocumentationArtifact {
        relative_path: candidate.relative_path.clone(),
        language: candidate.language,
        documentation,
        summary,
        threat_model,
    };

    let cache = Arc::clone(&ctx.cache);
    let artifact = tokio::task::spawn_blocking(move || {
        cache.commit(&artifact, fingerprint).map(|_| artifact)
    })
    .await
    .map_err(|e| fail(FailureReason::CommitFailed, e.to_string()))?
    .map_err(|e| fail(FailureReason::CommitFailed, e.to_string()))?;

    info!(path, truncated = truncation.was_truncated, "documented");
    Ok(artifact)
}
