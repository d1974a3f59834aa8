//! Ignore filter and file classification.
//!
//! A path is documented only when it survives three checks:
//!
//! 1. `.gitignore`-style patterns (the repository's root `.gitignore` plus
//!    configured extra lines) do not ignore it or any of its parents.
//! 2. The built-in deny-list does not match it: dependency and build
//!    directories, installer manifests, lock files, minified bundles, and
//!    hidden dot-files.
//! 3. Its extension is claimed by an enabled [`LanguageProfile`].
//!
//! [`FileClassifier::classify`] is a pure function of the path and the
//! pattern set loaded at construction.

use std::collections::HashSet;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::FilterError;
use crate::languages::{LanguageProfile, LanguageRegistry};

/// Directory names that never contain first-party source.
const DENY_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".env",
    "node_modules",
    "vendor",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "dist",
    "build",
    "target",
    ".git",
];

/// Installer scripts, dependency manifests, and lock files.
const DENY_FILES: &[&str] = &[
    "setup.py",
    "setup.cfg",
    "setup.sh",
    "install.sh",
    "requirements.txt",
    "Pipfile",
    "Pipfile.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "composer.json",
    "composer.lock",
    "Gemfile",
    "Gemfile.lock",
    "Cargo.lock",
];

/// Generated or bundled assets.
const DENY_GLOBS: &[&str] = &["**/*.min.js", "**/*.min.css", "**/*.bundle.js", "**/*.map"];

/// Dot-files that are still allowed through the hidden-file rule.
const ALLOWED_DOTFILES: &[&str] = &[".gitignore", ".env.example"];

/// Pattern inputs for the ignore filter.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Read `<root>/.gitignore` when present.
    pub use_gitignore: bool,
    /// Extra `.gitignore`-syntax lines.
    pub ignore_patterns: Vec<String>,
    /// Extra globs matched against the relative path.
    pub exclude_globs: Vec<String>,
    /// Additional directory names to deny (e.g. the output directory).
    pub extra_deny_dirs: Vec<String>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            ignore_patterns: Vec::new(),
            exclude_globs: Vec::new(),
            extra_deny_dirs: Vec::new(),
        }
    }
}

/// Combined ignore-pattern set and built-in deny-list.
#[derive(Debug)]
pub struct IgnoreFilter {
    gitignore: Gitignore,
    deny_globs: GlobSet,
    deny_dirs: HashSet<String>,
    deny_files: HashSet<&'static str>,
}

impl IgnoreFilter {
    /// Build the filter for a repository rooted at `root`.
    pub fn new(root: &Path, options: &FilterOptions) -> Result<Self, FilterError> {
        let mut builder = GitignoreBuilder::new(root);
        if options.use_gitignore {
            let path = root.join(".gitignore");
            if path.is_file() {
                if let Some(err) = builder.add(&path) {
                    // Partial errors still leave the valid lines loaded.
                    tracing::warn!(path = %path.display(), error = %err, "ignoring malformed .gitignore lines");
                }
            }
        }
        for line in &options.ignore_patterns {
            builder
                .add_line(None, line)
                .map_err(|source| FilterError::IgnorePattern {
                    pattern: line.clone(),
                    source,
                })?;
        }
        let gitignore = builder.build().map_err(|source| FilterError::IgnoreFile {
            path: root.join(".gitignore"),
            source,
        })?;

        let mut globs: Vec<String> = DENY_GLOBS.iter().map(|g| g.to_string()).collect();
        globs.extend(options.exclude_globs.iter().cloned());
        let deny_globs = build_globset(&globs)?;

        let mut deny_dirs: HashSet<String> = DENY_DIRS.iter().map(|d| d.to_string()).collect();
        deny_dirs.extend(options.extra_deny_dirs.iter().cloned());

        Ok(Self {
            gitignore,
            deny_globs,
            deny_dirs,
            deny_files: DENY_FILES.iter().copied().collect(),
        })
    }

    /// True when a directory (relative path) should not be descended into.
    pub fn excludes_dir(&self, relative_dir: &str) -> bool {
        if relative_dir.is_empty() {
            return false;
        }
        let name = relative_dir.rsplit('/').next().unwrap_or(relative_dir);
        if self.deny_dirs.contains(name) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(relative_dir, true)
            .is_ignore()
    }

    /// True when a file (relative path) is excluded.
    pub fn excludes_file(&self, relative_path: &str) -> bool {
        let mut components: Vec<&str> = relative_path.split('/').collect();
        let file_name = components.pop().unwrap_or(relative_path);

        if components.iter().any(|c| self.deny_dirs.contains(*c)) {
            return true;
        }
        if self.deny_files.contains(file_name) {
            return true;
        }
        if file_name.starts_with('.') && !ALLOWED_DOTFILES.contains(&file_name) {
            return true;
        }
        if self.deny_globs.is_match(relative_path) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(relative_path, false)
            .is_ignore()
    }
}

/// Joint ignore filter + language registry.
#[derive(Debug)]
pub struct FileClassifier {
    filter: IgnoreFilter,
    registry: LanguageRegistry,
}

impl FileClassifier {
    pub fn new(filter: IgnoreFilter, registry: LanguageRegistry) -> Self {
        Self { filter, registry }
    }

    /// Return the language profile for a documentable path, or `None` when
    /// the path is ignored, denied, or in an unsupported language.
    pub fn classify(&self, relative_path: &str) -> Option<&LanguageProfile> {
        if self.filter.excludes_file(relative_path) {
            return None;
        }
        let file_name = relative_path.rsplit('/').next()?;
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        self.registry.for_extension(ext)
    }

    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, FilterError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| FilterError::Glob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| FilterError::Glob {
        pattern: patterns.join(", "),
        source,
    })
}
