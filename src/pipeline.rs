//! Top-level run orchestration.
//!
//! Coordinates the full flow: walk + filter → change detection → generation
//! → aggregation. The [`CacheStore`] is created here and handed explicitly to
//! the orchestrator; it is loaded when the run starts and persisted after
//! every successful file. Cache writes run on the blocking pool.
//!
//! Configuration errors (bad patterns, missing repository) fail the run up
//! front. Once generation starts, failures stay scoped to their file.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{self, Aggregate, AggregateOutputs};
use crate::cache::{CacheDiff, CacheStore};
use crate::filter::{FileClassifier, FilterOptions, IgnoreFilter};
use crate::fingerprint::SamplingPolicy;
use crate::generate::{self, GenerationContext, GenerationSettings};
use crate::inference::{InferenceClient, RetryPolicy};
use crate::languages::{LanguageRegistry, LanguageSelection};
use crate::models::{DocumentationArtifact, FileCandidate, TaskFailure};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scan::scan_repository;
use crate::truncate::MIN_BUDGET_TOKENS;

/// Everything the core reads. Built by the caller; never parsed here.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repo_root: PathBuf,
    pub output_dir: PathBuf,
    /// Input token budget per file.
    pub budget_tokens: usize,
    pub concurrency: usize,
    pub max_output_tokens: u32,
    pub summary_max_output_tokens: u32,
    pub diagram_max_output_tokens: u32,
    pub languages: LanguageSelection,
    pub filter: FilterOptions,
    pub sampling: SamplingPolicy,
    pub retry: RetryPolicy,
    /// Ignore the cache snapshot and regenerate every file.
    pub full: bool,
    /// Also produce a per-file threat model and the logic-flaw report.
    pub threat_model: bool,
}

impl RunOptions {
    /// Defaults for a repository, with output under `<repo>/.wraith`.
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        Self {
            output_dir: repo_root.join(".wraith"),
            repo_root,
            budget_tokens: 8000,
            concurrency: 4,
            max_output_tokens: 2048,
            summary_max_output_tokens: 256,
            diagram_max_output_tokens: 2048,
            languages: LanguageSelection::default(),
            filter: FilterOptions {
                extra_deny_dirs: vec![".wraith".to_string()],
                ..FilterOptions::default()
            },
            sampling: SamplingPolicy::default(),
            retry: RetryPolicy::default(),
            full: false,
            threat_model: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub candidates: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub generated: usize,
    pub failed: usize,
    pub pruned: usize,
    /// Walk entries that could not be read.
    pub skipped: usize,
    pub cancelled: bool,
    pub aggregate: Aggregate,
    pub outputs: Option<AggregateOutputs>,
}

impl RunReport {
    /// No file was documented. Reported, not an error.
    pub fn is_empty_repository(&self) -> bool {
        !self.cancelled && self.aggregate.is_empty_repository()
    }
}

/// Candidate and change counts without calling the inference service.
#[derive(Debug)]
pub struct Plan {
    pub candidates: Vec<FileCandidate>,
    pub diff: CacheDiff,
    pub skipped: usize,
}

fn cache_for(options: &RunOptions) -> CacheStore {
    let store = if options.full {
        CacheStore::empty(&options.output_dir)
    } else {
        CacheStore::open(&options.output_dir)
    };
    store.requiring_threat_models(options.threat_model)
}

/// Walk, filter, and classify the repository.
fn discover(
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<(LanguageRegistry, Vec<FileCandidate>, usize)> {
    let registry =
        LanguageRegistry::new(&options.languages).context("Failed to compile language patterns")?;
    let filter = IgnoreFilter::new(&options.repo_root, &options.filter)?;
    let classifier = FileClassifier::new(filter, registry.clone());

    progress.report(ProgressEvent::Discovering {
        repo: options.repo_root.display().to_string(),
    });
    let scan = scan_repository(&options.repo_root, &classifier)?;
    info!(
        candidates = scan.candidates.len(),
        skipped = scan.skipped,
        "repository scanned"
    );
    Ok((registry, scan.candidates, scan.skipped))
}

async fn diff_in_background(
    cache: Arc<CacheStore>,
    candidates: Vec<FileCandidate>,
    sampling: SamplingPolicy,
) -> Result<CacheDiff> {
    tokio::task::spawn_blocking(move || cache.diff(candidates, &sampling))
        .await
        .context("change detection task failed")
}

/// Compute what a run would do.
pub async fn plan(options: &RunOptions) -> Result<Plan> {
    let (_, candidates, skipped) = discover(options, &crate::progress::NoProgress)?;
    let cache = Arc::new(cache_for(options));
    let diff = diff_in_background(cache, candidates.clone(), options.sampling).await?;
    Ok(Plan {
        candidates,
        diff,
        skipped,
    })
}

/// Run the whole pipeline for one repository.
pub async fn run(
    options: &RunOptions,
    client: Arc<dyn InferenceClient>,
    cancel: CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let budget_tokens = if options.budget_tokens < MIN_BUDGET_TOKENS {
        warn!(
            requested = options.budget_tokens,
            used = MIN_BUDGET_TOKENS,
            "token budget too small, raising it"
        );
        MIN_BUDGET_TOKENS
    } else {
        options.budget_tokens
    };

    let (registry, candidates, skipped) = discover(options, progress)?;
    let keep: HashSet<String> = candidates.iter().map(|c| c.relative_path.clone()).collect();

    let cache = Arc::new(cache_for(options));
    let diff = diff_in_background(Arc::clone(&cache), candidates, options.sampling).await?;

    let mut report = RunReport {
        candidates: keep.len(),
        changed: diff.changed.len(),
        unchanged: diff.unchanged.len(),
        skipped,
        ..RunReport::default()
    };
    progress.report(ProgressEvent::Planned {
        changed: report.changed as u64,
        unchanged: report.unchanged as u64,
    });
    info!(
        changed = report.changed,
        unchanged = report.unchanged,
        model = client.model_name(),
        "starting generation"
    );

    let ctx = GenerationContext {
        registry: Arc::new(registry),
        cache: Arc::clone(&cache),
        client: Arc::clone(&client),
        settings: GenerationSettings {
            budget_tokens,
            concurrency: options.concurrency,
            max_output_tokens: options.max_output_tokens,
            summary_max_output_tokens: options.summary_max_output_tokens,
            threat_model: options.threat_model,
            retry: options.retry,
            sampling: options.sampling,
        },
        cancel: cancel.clone(),
    };
    let outcomes = generate::run(diff.changed, &ctx, progress).await;

    let mut artifacts: Vec<DocumentationArtifact> = diff.unchanged;
    let mut failures: Vec<TaskFailure> = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(artifact) => {
                report.generated += 1;
                artifacts.push(artifact);
            }
            Err(failure) => failures.push(failure),
        }
    }
    report.failed = failures.len();

    if cancel.is_cancelled() {
        warn!(
            generated = report.generated,
            "run cancelled, skipping aggregation"
        );
        report.cancelled = true;
        report.aggregate.failures = crate::models::FailureReport::from_failures(failures);
        return Ok(report);
    }

    let pruning = Arc::clone(&cache);
    match tokio::task::spawn_blocking(move || pruning.prune(&keep)).await {
        Ok(Ok(n)) => report.pruned = n,
        Ok(Err(e)) => warn!(error = %e, "failed to prune stale cache entries"),
        Err(e) => warn!(error = %e, "prune task failed"),
    }

    progress.report(ProgressEvent::Aggregating {
        files: artifacts.len() as u64,
    });
    let aggregate = aggregate::finalize(
        &artifacts,
        failures,
        options.threat_model,
        client.as_ref(),
        options.diagram_max_output_tokens,
        &options.retry,
        &cancel,
    )
    .await;

    let outputs = aggregate::write_outputs(&options.output_dir, &aggregate).with_context(|| {
        format!(
            "Failed to write repository outputs to {}",
            options.output_dir.display()
        )
    })?;

    info!(
        generated = report.generated,
        failed = report.failed,
        cached = report.unchanged,
        "run complete"
    );
    report.aggregate = aggregate;
    report.outputs = Some(outputs);
    Ok(report)
}
