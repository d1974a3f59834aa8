//! Change-detection cache and artifact store.
//!
//! The cache is a JSON snapshot mapping repository-relative paths to the
//! fingerprint of the content last documented successfully, plus the summary
//! produced for it. Full documentation lives in one markdown artifact per file
//! under `<output>/docs/`, so the two halves of a commit are:
//!
//! 1. the artifact, written to a temp file and renamed into place;
//! 2. the cache entry, inserted and the whole snapshot atomically rewritten.
//!
//! [`CacheStore::commit`] performs them in that order. Each entry records the
//! digest of the artifact it was committed with, and [`CacheStore::diff`] only
//! reuses an artifact whose bytes still match that digest. A crash between the
//! two writes therefore leaves an artifact no entry vouches for, and the file
//! is regenerated even if its source was reverted in the meantime. An entry
//! whose artifact is missing is also treated as changed.
//!
//! Snapshot writes are serialized by a `std::sync::Mutex`; the snapshot on
//! disk only ever contains fully committed entries. Every method does
//! blocking file I/O, so async callers go through `spawn_blocking`.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::CacheError;
use crate::fingerprint::{digest, fingerprint_file, Fingerprint, SamplingPolicy};
use crate::languages::LanguageId;
use crate::models::{DocumentationArtifact, FileCandidate};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE: &str = "cache.json";
pub const DOCS_DIR: &str = "docs";
pub const ARTIFACT_SUFFIX: &str = ".docs.md";

/// One committed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub language: LanguageId,
    pub summary: String,
    /// SHA-256 of the rendered artifact written by the same commit.
    #[serde(default)]
    pub artifact_digest: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_model: Option<String>,
    pub last_success: DateTime<Utc>,
}

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// A candidate that must be (re)generated.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub candidate: FileCandidate,
    /// Why it was selected, for logs.
    pub cause: ChangeCause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    New,
    ContentChanged,
    ArtifactMissing,
    /// The artifact on disk is not the one the entry was committed with.
    ArtifactStale,
    /// Threat models are requested and the entry has none.
    ThreatModelMissing,
    Unreadable,
}

/// Result of comparing candidates against the snapshot.
#[derive(Debug, Default)]
pub struct CacheDiff {
    pub changed: Vec<ChangedFile>,
    pub unchanged: Vec<DocumentationArtifact>,
}

/// Read a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, CacheError> {
    let content = std::fs::read_to_string(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot: Snapshot =
        serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Version {
            path: path.to_path_buf(),
            found: snapshot.version,
        });
    }
    Ok(snapshot)
}

/// Artifact location for a relative path.
pub fn artifact_path(output_dir: &Path, relative_path: &str) -> PathBuf {
    let mut path = output_dir.join(DOCS_DIR);
    for part in relative_path.split('/') {
        path.push(part);
    }
    let mut name = path.into_os_string();
    name.push(ARTIFACT_SUFFIX);
    PathBuf::from(name)
}

/// Render an artifact as its markdown document.
pub fn render_artifact(artifact: &DocumentationArtifact) -> String {
    format!(
        "# {} Code Documentation: {}\n\n{}\n",
        artifact.language.display_name(),
        artifact.relative_path,
        artifact.documentation.trim_end()
    )
}

fn parse_artifact(markdown: &str) -> Option<String> {
    let (header, body) = markdown.split_once("\n\n")?;
    if !header.starts_with("# ") {
        return None;
    }
    Some(body.trim_end().to_string())
}

/// Write `content` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CacheError> {
    let persist_err = |source: std::io::Error| CacheError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(persist_err)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(persist_err)?;
    tmp.write_all(content).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

/// Write the artifact document for one file and return its digest.
pub(crate) fn write_artifact(
    output_dir: &Path,
    artifact: &DocumentationArtifact,
) -> Result<Fingerprint, CacheError> {
    let path = artifact_path(output_dir, &artifact.relative_path);
    let rendered = render_artifact(artifact);
    write_atomic(&path, rendered.as_bytes())?;
    Ok(digest(rendered.as_bytes()))
}

/// Persistent fingerprint cache paired with the artifact directory.
#[derive(Debug)]
pub struct CacheStore {
    output_dir: PathBuf,
    snapshot: Mutex<Snapshot>,
    require_threat_model: bool,
}

impl CacheStore {
    /// Load the snapshot under `output_dir`. A missing or unusable snapshot
    /// yields an empty store and a logged warning.
    pub fn open(output_dir: &Path) -> Self {
        let path = output_dir.join(SNAPSHOT_FILE);
        let snapshot = if path.exists() {
            match read_snapshot(&path) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding cache snapshot, every file will be regenerated");
                    Snapshot::empty()
                }
            }
        } else {
            tracing::debug!(path = %path.display(), "no cache snapshot, starting empty");
            Snapshot::empty()
        };
        Self {
            output_dir: output_dir.to_path_buf(),
            snapshot: Mutex::new(snapshot),
            require_threat_model: false,
        }
    }

    /// Store that ignores any existing snapshot. Committing overwrites it.
    pub fn empty(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            snapshot: Mutex::new(Snapshot::empty()),
            require_threat_model: false,
        }
    }

    /// Treat entries without a threat model as changed.
    pub fn requiring_threat_models(mut self, required: bool) -> Self {
        self.require_threat_model = required;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(SNAPSHOT_FILE)
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, relative_path: &str) -> Option<CacheEntry> {
        self.lock().entries.get(relative_path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split candidates into changed files and unchanged cached artifacts.
    pub fn diff(&self, candidates: Vec<FileCandidate>, policy: &SamplingPolicy) -> CacheDiff {
        let entries = self.lock().entries.clone();
        let mut diff = CacheDiff::default();

        for candidate in candidates {
            let fingerprint = match fingerprint_file(&candidate.absolute_path, policy) {
                Ok(fp) => fp,
                Err(e) => {
                    tracing::debug!(path = %candidate.relative_path, error = %e, "cannot fingerprint");
                    diff.changed.push(ChangedFile {
                        candidate,
                        cause: ChangeCause::Unreadable,
                    });
                    continue;
                }
            };

            let cause = match entries.get(&candidate.relative_path) {
                None => ChangeCause::New,
                Some(entry)
                    if entry.fingerprint != fingerprint || entry.language != candidate.language =>
                {
                    ChangeCause::ContentChanged
                }
                Some(entry) if self.require_threat_model && entry.threat_model.is_none() => {
                    ChangeCause::ThreatModelMissing
                }
                Some(entry) => {
                    let path = artifact_path(&self.output_dir, &candidate.relative_path);
                    match std::fs::read_to_string(&path) {
                        Err(_) => ChangeCause::ArtifactMissing,
                        Ok(markdown) if digest(markdown.as_bytes()) != entry.artifact_digest => {
                            ChangeCause::ArtifactStale
                        }
                        Ok(markdown) => match parse_artifact(&markdown) {
                            Some(documentation) => {
                                diff.unchanged.push(DocumentationArtifact {
                                    relative_path: candidate.relative_path.clone(),
                                    language: candidate.language,
                                    documentation,
                                    summary: entry.summary.clone(),
                                    threat_model: entry.threat_model.clone(),
                                });
                                continue;
                            }
                            None => ChangeCause::ArtifactStale,
                        },
                    }
                }
            };
            diff.changed.push(ChangedFile { candidate, cause });
        }

        diff
    }

    /// Durably record a successful generation: artifact first, then the
    /// cache entry. On error nothing new is visible in the snapshot, and an
    /// artifact left behind no longer matches any entry's digest.
    pub fn commit(
        &self,
        artifact: &DocumentationArtifact,
        fingerprint: Fingerprint,
    ) -> Result<CacheEntry, CacheError> {
        let artifact_digest = write_artifact(&self.output_dir, artifact)?;

        let entry = CacheEntry {
            fingerprint,
            language: artifact.language,
            summary: artifact.summary.clone(),
            artifact_digest,
            threat_model: artifact.threat_model.clone(),
            last_success: Utc::now(),
        };

        let mut snapshot = self.lock();
        let previous = snapshot
            .entries
            .insert(artifact.relative_path.clone(), entry.clone());
        if let Err(e) = self.persist_locked(&snapshot) {
            match previous {
                Some(prev) => snapshot.entries.insert(artifact.relative_path.clone(), prev),
                None => snapshot.entries.remove(&artifact.relative_path),
            };
            return Err(e);
        }
        Ok(entry)
    }

    /// Drop entries (and their artifacts) for paths not in `keep`.
    /// Returns the number of pruned entries.
    pub fn prune(&self, keep: &HashSet<String>) -> Result<usize, CacheError> {
        let mut snapshot = self.lock();
        let stale: Vec<String> = snapshot
            .entries
            .keys()
            .filter(|k| !keep.contains(*k))
            .cloned()
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        for path in &stale {
            snapshot.entries.remove(path);
            let artifact = artifact_path(&self.output_dir, path);
            if let Err(e) = std::fs::remove_file(&artifact) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %artifact.display(), error = %e, "failed to remove stale artifact");
                }
            }
        }
        self.persist_locked(&snapshot)?;
        Ok(stale.len())
    }

    /// Rewrite the snapshot file.
    pub fn persist(&self) -> Result<(), CacheError> {
        let snapshot = self.lock();
        self.persist_locked(&snapshot)
    }

    fn persist_locked(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.snapshot_path(), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidate(root: &Path, rel: &str, content: &str) -> FileCandidate {
        let abs = root.join(rel);
        std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
        std::fs::write(&abs, content).unwrap();
        FileCandidate {
            relative_path: rel.to_string(),
            absolute_path: abs,
            language: LanguageId::Python,
            size_bytes: content.len() as u64,
        }
    }

    fn artifact(rel: &str, doc: &str, summary: &str) -> DocumentationArtifact {
        DocumentationArtifact {
            relative_path: rel.to_string(),
            language: LanguageId::Python,
            documentation: doc.to_string(),
            summary: summary.to_string(),
            threat_model: None,
        }
    }

    fn fp(c: &FileCandidate) -> Fingerprint {
        fingerprint_file(&c.absolute_path, &SamplingPolicy::default()).unwrap()
    }

    #[test]
    fn artifact_path_uses_suffix() {
        let path = artifact_path(Path::new("/out"), "src/app.py");
        assert_eq!(path, PathBuf::from("/out/docs/src/app.py.docs.md"));
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path());
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SNAPSHOT_FILE), "{ not json").unwrap();
        assert!(matches!(
            read_snapshot(&tmp.path().join(SNAPSHOT_FILE)),
            Err(CacheError::Corrupt { .. })
        ));
        let store = CacheStore::open(tmp.path());
        assert!(store.is_empty());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(SNAPSHOT_FILE),
            r#"{"version": 99, "entries": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            read_snapshot(&tmp.path().join(SNAPSHOT_FILE)),
            Err(CacheError::Version { found: 99, .. })
        ));
    }

    #[test]
    fn commit_then_diff_reports_unchanged() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "src/app.py", "def main():\n    pass\n");

        let store = CacheStore::open(out.path());
        let diff = store.diff(vec![c.clone()], &SamplingPolicy::default());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].cause, ChangeCause::New);

        store
            .commit(&artifact("src/app.py", "Full docs.", "Entry point."), fp(&c))
            .unwrap();

        let reopened = CacheStore::open(out.path());
        let diff = reopened.diff(vec![c], &SamplingPolicy::default());
        assert!(diff.changed.is_empty());
        assert_eq!(diff.unchanged.len(), 1);
        assert_eq!(diff.unchanged[0].documentation, "Full docs.");
        assert_eq!(diff.unchanged[0].summary, "Entry point.");
    }

    #[test]
    fn content_change_detected() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        let store = CacheStore::open(out.path());
        store.commit(&artifact("a.py", "d", "s"), fp(&c)).unwrap();

        let c = candidate(repo.path(), "a.py", "x = 2\n");
        let diff = store.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(diff.changed[0].cause, ChangeCause::ContentChanged);
    }

    #[test]
    fn interrupted_before_cache_commit_is_reprocessed() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        let store = CacheStore::open(out.path());
        store.commit(&artifact("a.py", "old docs", "old"), fp(&c)).unwrap();

        // New content documented, artifact written, process dies before the entry commit.
        let c = candidate(repo.path(), "a.py", "x = 2\n");
        write_artifact(out.path(), &artifact("a.py", "new docs", "new")).unwrap();

        let reopened = CacheStore::open(out.path());
        let diff = reopened.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(reopened.get("a.py").unwrap().summary, "old");
    }

    #[test]
    fn reverted_source_after_interrupted_commit_is_reprocessed() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        let store = CacheStore::open(out.path());
        store
            .commit(&artifact("a.py", "docs for x = 1", "summary for x = 1"), fp(&c))
            .unwrap();

        // x = 2 is documented and its artifact lands, then the run dies
        // before the entry is written. The user reverts the source.
        candidate(repo.path(), "a.py", "x = 2\n");
        write_artifact(out.path(), &artifact("a.py", "docs for x = 2", "summary for x = 2"))
            .unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");

        let reopened = CacheStore::open(out.path());
        let diff = reopened.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].cause, ChangeCause::ArtifactStale);
        assert!(diff.unchanged.is_empty());
    }

    #[test]
    fn entry_without_digest_is_stale() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        write_artifact(out.path(), &artifact("a.py", "d", "s")).unwrap();
        let snapshot = format!(
            r#"{{"version": 1, "entries": {{"a.py": {{"fingerprint": "{}", "language": "python", "summary": "s", "last_success": "2024-01-01T00:00:00Z"}}}}}}"#,
            fp(&c)
        );
        std::fs::write(out.path().join(SNAPSHOT_FILE), snapshot).unwrap();

        let store = CacheStore::open(out.path());
        assert_eq!(store.len(), 1);
        let diff = store.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(diff.changed[0].cause, ChangeCause::ArtifactStale);
    }

    #[test]
    fn threat_model_requirement_invalidates_old_entries() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        CacheStore::open(out.path())
            .commit(&artifact("a.py", "d", "s"), fp(&c))
            .unwrap();

        let store = CacheStore::open(out.path()).requiring_threat_models(true);
        let diff = store.diff(vec![c.clone()], &SamplingPolicy::default());
        assert_eq!(diff.changed[0].cause, ChangeCause::ThreatModelMissing);

        let mut with_model = artifact("a.py", "d", "s");
        with_model.threat_model = Some("No findings.".to_string());
        store.commit(&with_model, fp(&c)).unwrap();
        let diff = store.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(
            diff.unchanged[0].threat_model.as_deref(),
            Some("No findings.")
        );
    }

    #[test]
    fn missing_artifact_forces_regeneration() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let c = candidate(repo.path(), "a.py", "x = 1\n");
        let store = CacheStore::open(out.path());
        store.commit(&artifact("a.py", "d", "s"), fp(&c)).unwrap();
        std::fs::remove_file(artifact_path(out.path(), "a.py")).unwrap();

        let diff = store.diff(vec![c], &SamplingPolicy::default());
        assert_eq!(diff.changed[0].cause, ChangeCause::ArtifactMissing);
    }

    #[test]
    fn unreadable_file_is_changed() {
        let out = TempDir::new().unwrap();
        let store = CacheStore::open(out.path());
        let ghost = FileCandidate {
            relative_path: "gone.py".to_string(),
            absolute_path: out.path().join("gone.py"),
            language: LanguageId::Python,
            size_bytes: 0,
        };
        let diff = store.diff(vec![ghost], &SamplingPolicy::default());
        assert_eq!(diff.changed[0].cause, ChangeCause::Unreadable);
    }

    #[test]
    fn prune_removes_stale_entries_and_artifacts() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let a = candidate(repo.path(), "a.py", "a = 1\n");
        let b = candidate(repo.path(), "b.py", "b = 1\n");
        let store = CacheStore::open(out.path());
        store.commit(&artifact("a.py", "d", "s"), fp(&a)).unwrap();
        store.commit(&artifact("b.py", "d", "s"), fp(&b)).unwrap();

        let keep: HashSet<String> = ["a.py".to_string()].into_iter().collect();
        assert_eq!(store.prune(&keep).unwrap(), 1);
        assert!(store.get("b.py").is_none());
        assert!(!artifact_path(out.path(), "b.py").exists());

        let reopened = CacheStore::open(out.path());
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn artifact_round_trips_through_markdown() {
        let a = artifact("pkg/mod.py", "## Overview\n\nDoes things.\n\n", "s");
        let rendered = render_artifact(&a);
        assert!(rendered.starts_with("# Python Code Documentation: pkg/mod.py\n\n"));
        assert_eq!(
            parse_artifact(&rendered).unwrap(),
            "## Overview\n\nDoes things."
        );
    }
}
