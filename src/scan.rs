//! Repository walk.
//!
//! Produces the sorted list of [`FileCandidate`]s for a repository root.
//! Excluded directories are pruned before descending; every remaining file is
//! passed through [`FileClassifier::classify`]. Unreadable entries are logged
//! and skipped.

use walkdir::WalkDir;

use crate::error::FilterError;
use crate::filter::FileClassifier;
use crate::models::FileCandidate;
use std::path::Path;

/// Outcome of a repository walk.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub candidates: Vec<FileCandidate>,
    /// Entries that could not be read.
    pub skipped: usize,
}

/// Walk `root` and return every documentable file, sorted by relative path.
pub fn scan_repository(root: &Path, classifier: &FileClassifier) -> Result<ScanResult, FilterError> {
    if !root.is_dir() {
        return Err(FilterError::MissingRoot(root.to_path_buf()));
    }

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = relative_str(root, entry.path());
            !classifier.filter().excludes_dir(&rel)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let err = FilterError::from(e);
                tracing::warn!(error = %err, "skipping entry");
                result.skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_str(root, entry.path());
        let Some(profile) = classifier.classify(&rel) else {
            continue;
        };

        let size_bytes = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %rel, error = %e, "skipping file with unreadable metadata");
                result.skipped += 1;
                continue;
            }
        };

        result.candidates.push(FileCandidate {
            relative_path: rel,
            absolute_path: entry.path().to_path_buf(),
            language: profile.id,
            size_bytes,
        });
    }

    result
        .candidates
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(result)
}

/// Repository-relative path with `/` separators.
fn relative_str(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOptions, IgnoreFilter};
    use crate::languages::{LanguageId, LanguageRegistry};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_collects_sorted_supported_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "src/app.py", "print('hi')\n");
        write(root, "src/lib/util.go", "package lib\n");
        write(root, "README.md", "# readme\n");
        write(root, "node_modules/x/index.js", "module.exports = 1;\n");
        write(root, "vendor/lib.min.js", "!function(){}();\n");
        write(root, "out/gen.rs", "fn x() {}\n");
        write(root, ".gitignore", "out/\n");

        let filter = IgnoreFilter::new(root, &FilterOptions::default()).unwrap();
        let classifier = FileClassifier::new(filter, LanguageRegistry::all().unwrap());
        let result = scan_repository(root, &classifier).unwrap();

        let paths: Vec<&str> = result
            .candidates
            .iter()
            .map(|c| c.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["src/app.py", "src/lib/util.go"]);
        assert_eq!(result.candidates[0].language, LanguageId::Python);
        assert_eq!(result.candidates[0].size_bytes, 12);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let filter = IgnoreFilter::new(tmp.path(), &FilterOptions::default()).unwrap();
        let classifier = FileClassifier::new(filter, LanguageRegistry::all().unwrap());
        assert!(matches!(
            scan_repository(&missing, &classifier),
            Err(FilterError::MissingRoot(_))
        ));
    }
}
