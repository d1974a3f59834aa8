//! TOML configuration.
//!
//! Every section is optional; a missing file path yields [`Config::default`].
//! The pipeline itself never reads this type: [`Config::run_options`]
//! flattens it into the plain [`RunOptions`] structure the core consumes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filter::FilterOptions;
use crate::fingerprint::{SamplingPolicy, DEFAULT_SAMPLE_SLICE, DEFAULT_SAMPLE_THRESHOLD};
use crate::inference::RetryPolicy;
use crate::languages::{LanguageId, LanguageSelection};
use crate::pipeline::RunOptions;
use crate::truncate::MIN_BUDGET_TOKENS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub languages: LanguagesConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Input token budget per file.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_summary_max_output_tokens")]
    pub summary_max_output_tokens: u32,
    #[serde(default = "default_max_output_tokens")]
    pub diagram_max_output_tokens: u32,
    /// Also produce a per-file threat model and `logic-flaws.analysis.md`.
    #[serde(default)]
    pub threat_model: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            concurrency: default_concurrency(),
            max_output_tokens: default_max_output_tokens(),
            summary_max_output_tokens: default_summary_max_output_tokens(),
            diagram_max_output_tokens: default_max_output_tokens(),
            threat_model: false,
        }
    }
}

fn default_max_tokens() -> usize {
    8000
}
fn default_concurrency() -> usize {
    4
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_summary_max_output_tokens() -> u32 {
    256
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LanguagesConfig {
    /// When non-empty, only these languages are processed.
    #[serde(default)]
    pub enable: Vec<String>,
    #[serde(default)]
    pub disable: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub use_gitignore: bool,
    /// Extra `.gitignore`-syntax lines.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            ignore_patterns: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_sample_threshold")]
    pub sample_threshold_bytes: u64,
    #[serde(default = "default_sample_slice")]
    pub sample_slice_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sample_threshold_bytes: DEFAULT_SAMPLE_THRESHOLD,
            sample_slice_bytes: DEFAULT_SAMPLE_SLICE,
        }
    }
}

fn default_sample_threshold() -> u64 {
    DEFAULT_SAMPLE_THRESHOLD
}
fn default_sample_slice() -> u64 {
    DEFAULT_SAMPLE_SLICE
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL override for the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    32_000
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Output directory, relative to the repository root unless absolute.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".wraith")
}

impl Config {
    /// Parse and validate a language id list.
    fn language_ids(names: &[String]) -> Result<Vec<LanguageId>> {
        names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.parse::<LanguageId>().map_err(anyhow::Error::msg))
            .collect()
    }

    pub fn language_selection(&self) -> Result<LanguageSelection> {
        Ok(LanguageSelection {
            enable: Self::language_ids(&self.languages.enable)?,
            disable: Self::language_ids(&self.languages.disable)?,
        })
    }

    /// Resolve the output directory for a repository.
    pub fn output_dir(&self, repo_root: &Path) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            repo_root.join(&self.output.dir)
        }
    }

    /// Flatten into the options structure the pipeline reads.
    pub fn run_options(&self, repo_root: &Path) -> Result<RunOptions> {
        let output_dir = self.output_dir(repo_root);

        // Keep the output directory out of the walk when it lives inside the repo.
        let mut extra_deny_dirs = Vec::new();
        if let Ok(rel) = output_dir.strip_prefix(repo_root) {
            if let Some(first) = rel.components().next() {
                extra_deny_dirs.push(first.as_os_str().to_string_lossy().to_string());
            }
        }

        Ok(RunOptions {
            repo_root: repo_root.to_path_buf(),
            output_dir,
            budget_tokens: self.generation.max_tokens,
            concurrency: self.generation.concurrency,
            max_output_tokens: self.generation.max_output_tokens,
            summary_max_output_tokens: self.generation.summary_max_output_tokens,
            diagram_max_output_tokens: self.generation.diagram_max_output_tokens,
            threat_model: self.generation.threat_model,
            languages: self.language_selection()?,
            filter: FilterOptions {
                use_gitignore: self.filter.use_gitignore,
                ignore_patterns: self.filter.ignore_patterns.clone(),
                exclude_globs: self.filter.exclude_globs.clone(),
                extra_deny_dirs,
            },
            sampling: SamplingPolicy {
                threshold_bytes: self.cache.sample_threshold_bytes,
                slice_bytes: self.cache.sample_slice_bytes,
            },
            retry: self.inference.retry_policy(),
            full: false,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.max_tokens < MIN_BUDGET_TOKENS {
            anyhow::bail!("generation.max_tokens must be >= {}", MIN_BUDGET_TOKENS);
        }
        if self.generation.concurrency == 0 {
            anyhow::bail!("generation.concurrency must be >= 1");
        }
        if self.cache.sample_slice_bytes == 0 {
            anyhow::bail!("cache.sample_slice_bytes must be > 0");
        }
        self.language_selection()?;

        match self.inference.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown inference provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.inference.is_enabled() && self.inference.model.trim().is_empty() {
            anyhow::bail!(
                "inference.model must be specified when provider is '{}'",
                self.inference.provider
            );
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` when given, otherwise the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wraith.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.generation.max_tokens, 8000);
        assert_eq!(config.generation.concurrency, 4);
        assert_eq!(config.inference.provider, "openai");
        assert_eq!(config.cache.sample_threshold_bytes, 1024 * 1024);
        assert!(config.filter.use_gitignore);
        assert!(!config.generation.threat_model);
    }

    #[test]
    fn parses_sections() {
        let (_tmp, path) = write_config(
            r#"
[generation]
max_tokens = 2000
concurrency = 8
threat_model = true

[languages]
enable = ["python", "go"]

[inference]
provider = "ollama"
model = "llama3"
max_retries = 2

[output]
dir = "docs-out"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.generation.max_tokens, 2000);
        assert_eq!(config.generation.concurrency, 8);
        assert_eq!(config.inference.retry_policy().max_retries, 2);

        let selection = config.language_selection().unwrap();
        assert_eq!(selection.enable, vec![LanguageId::Python, LanguageId::Go]);

        let options = config.run_options(Path::new("/repo")).unwrap();
        assert_eq!(options.output_dir, PathBuf::from("/repo/docs-out"));
        assert_eq!(options.filter.extra_deny_dirs, vec!["docs-out".to_string()]);
        assert_eq!(options.budget_tokens, 2000);
        assert!(options.threat_model);
    }

    #[test]
    fn rejects_unknown_language() {
        let (_tmp, path) = write_config("[languages]\ndisable = [\"cobol\"]\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn rejects_zero_concurrency_and_bad_provider() {
        let (_tmp, path) = write_config("[generation]\nconcurrency = 0\n");
        assert!(load_config(&path).is_err());
        let (_tmp, path) = write_config("[inference]\nprovider = \"bedrock\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn absolute_output_dir_not_denied() {
        let mut config = Config::default();
        config.output.dir = PathBuf::from("/var/out");
        let options = config.run_options(Path::new("/repo")).unwrap();
        assert_eq!(options.output_dir, PathBuf::from("/var/out"));
        assert!(options.filter.extra_deny_dirs.is_empty());
    }
}
