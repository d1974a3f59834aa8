//! # Wraith CLI (`wraith`)
//!
//! Generates per-file documentation, a repository summary, and a data-flow /
//! threat diagram for a source repository. Reruns only touch files whose
//! content changed since the last successful run.
//!
//! ## Usage
//!
//! ```bash
//! wraith run <repo> [--config wraith.toml]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wraith run <repo>` | Document changed files and rebuild the repository outputs |
//! | `wraith run <repo> --dry-run` | Show candidate and changed counts without inference |
//! | `wraith languages` | List supported languages and whether each is enabled |
//!
//! ## Examples
//!
//! ```bash
//! # Document a repository with the default OpenAI model
//! export OPENAI_API_KEY=...
//! wraith run ./service
//!
//! # Only Python and Go, eight requests in flight
//! wraith run ./service --enable-languages python,go --concurrency 8
//!
//! # Ignore the cache and regenerate everything
//! wraith run ./service --full
//!
//! # Add per-file threat models and logic-flaws.analysis.md
//! wraith run ./service --threat-model
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wraith::config::{self, Config};
use wraith::inference;
use wraith::languages::{LanguageId, LanguageRegistry};
use wraith::pipeline::{self, RunReport};
use wraith::progress::ProgressMode;

/// Wraith: incremental, language-aware repository documentation.
#[derive(Parser)]
#[command(
    name = "wraith",
    about = "Wraith: incremental documentation and threat-flow diagrams for source repositories",
    version,
    long_about = "Wraith walks a repository, documents every supported source file with a \
    text-generation service, summarizes each document, and synthesizes a repository-level \
    data-flow / threat diagram. Content fingerprints keep reruns incremental."
)]
struct Cli {
    /// Path to a configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Document a repository.
    ///
    /// Files whose fingerprint matches the cache are reused; everything else
    /// is sent to the inference service. Per-file failures are reported and
    /// do not change the exit code.
    Run {
        /// Repository root.
        repo: PathBuf,

        /// Input token budget per file.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Maximum number of files processed at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Only process these languages (comma-separated ids).
        #[arg(long, value_delimiter = ',')]
        enable_languages: Vec<String>,

        /// Skip these languages (comma-separated ids).
        #[arg(long, value_delimiter = ',')]
        disable_languages: Vec<String>,

        /// Ignore the cache and regenerate every file.
        #[arg(long)]
        full: bool,

        /// Also write a per-file threat model and the logic-flaw report.
        #[arg(long)]
        threat_model: bool,

        /// Show candidate and changed counts without calling the service.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List supported languages.
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            repo,
            max_tokens,
            concurrency,
            enable_languages,
            disable_languages,
            full,
            threat_model,
            dry_run,
            progress,
        } => {
            if let Some(n) = max_tokens {
                cfg.generation.max_tokens = n;
            }
            if let Some(n) = concurrency {
                cfg.generation.concurrency = n;
            }
            if !enable_languages.is_empty() {
                cfg.languages.enable = enable_languages;
            }
            if !disable_languages.is_empty() {
                cfg.languages.disable = disable_languages;
            }
            if threat_model {
                cfg.generation.threat_model = true;
            }
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_command(&cfg, &repo, full, dry_run, progress).await?;
        }
        Commands::Languages => list_languages(&cfg)?,
    }

    Ok(())
}

async fn run_command(
    cfg: &Config,
    repo: &Path,
    full: bool,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    cfg.validate()?;
    let repo = repo
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", repo.display()))?;
    let mut options = cfg.run_options(&repo)?;
    options.full = full;

    if dry_run {
        let plan = pipeline::plan(&options).await?;
        println!("run {} (dry-run)", repo.display());
        println!("  candidates: {}", plan.candidates.len());
        println!("  changed: {}", plan.diff.changed.len());
        println!("  cached: {}", plan.diff.unchanged.len());
        if plan.skipped > 0 {
            println!("  skipped: {}", plan.skipped);
        }
        for file in &plan.diff.changed {
            println!("    {} ({:?})", file.candidate.relative_path, file.cause);
        }
        return Ok(());
    }

    let client: Arc<dyn inference::InferenceClient> =
        Arc::from(inference::create_client(&cfg.inference)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let reporter = progress.reporter();
    let report = pipeline::run(&options, client, cancel, reporter.as_ref()).await?;
    print_report(&repo, &report);
    Ok(())
}

fn print_report(repo: &Path, report: &RunReport) {
    println!("run {}", repo.display());
    println!("  candidates: {}", report.candidates);
    println!("  generated: {}", report.generated);
    println!("  cached: {}", report.unchanged);
    println!("  failed: {}", report.failed);
    if report.pruned > 0 {
        println!("  pruned: {}", report.pruned);
    }
    if report.skipped > 0 {
        println!("  skipped: {}", report.skipped);
    }
    for failure in &report.aggregate.failures.failures {
        println!(
            "    {} [{}] {}",
            failure.relative_path, failure.reason, failure.detail
        );
    }

    if report.cancelled {
        println!("cancelled");
        return;
    }
    if report.is_empty_repository() {
        println!("  no supported source files were documented");
    }
    if let Some(outputs) = &report.outputs {
        println!("  summary: {}", outputs.summary.display());
        match (&outputs.diagram, &report.aggregate.diagram_error) {
            (Some(path), _) => println!("  diagram: {}", path.display()),
            (None, Some(err)) => println!("  diagram: failed ({})", err),
            (None, None) => {}
        }
        if let Some(path) = &outputs.threat_models {
            println!("  threat models: {}", path.display());
        }
        println!("  failures: {}", outputs.failures.display());
    }
    println!("ok");
}

fn list_languages(cfg: &Config) -> Result<()> {
    let selection = cfg.language_selection()?;
    let registry = LanguageRegistry::all().context("Failed to compile language patterns")?;

    println!("{:<12} {:<8} EXTENSIONS", "LANGUAGE", "ENABLED");
    for id in LanguageId::ALL {
        let extensions = registry
            .get(id)
            .map(|p| p.extensions.join(", "))
            .unwrap_or_default();
        println!(
            "{:<12} {:<8} {}",
            id.as_str(),
            selection.is_enabled(id),
            extensions
        );
    }
    Ok(())
}
