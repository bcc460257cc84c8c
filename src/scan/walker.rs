//! Deterministic folder traversal.
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use ignore::WalkBuilder;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::matcher::IgnoreMatcher;

/// One eligible file found under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub absolute_path: PathBuf,
    /// `/`-separated path relative to the walked root.
    pub relative_path: String,
    pub size_bytes: u64,
    /// Lower-cased extension without the dot; empty when absent.
    pub extension: String,
}

impl Ord for FileDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.relative_path
            .cmp(&other.relative_path)
            .then_with(|| self.absolute_path.cmp(&other.absolute_path))
            .then_with(|| self.size_bytes.cmp(&other.size_bytes))
            .then_with(|| self.extension.cmp(&other.extension))
    }
}

impl PartialOrd for FileDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A non-fatal problem met while walking (unreadable directory, broken entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalIssue {
    pub path: Option<String>,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("not a readable directory: {}", .0.display())]
    InvalidRoot(PathBuf),
}

/// Result of a walk: eligible files plus what was left out.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Sorted by `relative_path`.
    pub files: Vec<FileDescriptor>,
    /// Entries rejected by the ignore rules. An ignored directory counts once;
    /// its contents are never visited.
    pub ignored: usize,
    pub issues: Vec<TraversalIssue>,
}

impl WalkOutcome {
    /// Files emitted plus entries ignored.
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.files.len() + self.ignored
    }
}

#[derive(Debug, Clone)]
pub struct FileWalker {
    matcher: Arc<IgnoreMatcher>,
    max_depth: Option<usize>,
}

impl FileWalker {
    #[must_use]
    pub fn new(matcher: Arc<IgnoreMatcher>) -> Self {
        Self {
            matcher,
            max_depth: None,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk `root`, pruning ignored directories before descending into them.
    ///
    /// Symlinks are neither followed nor emitted. Per-entry I/O failures are
    /// recorded in [`WalkOutcome::issues`] and the walk continues.
    pub fn walk(&self, root: &Path) -> Result<WalkOutcome, WalkError> {
        let root = std::path::absolute(root).map_err(|_| WalkError::InvalidRoot(root.into()))?;
        if !root.is_dir() {
            return Err(WalkError::InvalidRoot(root));
        }

        info!("Walking {}", root.display());

        let ignored = Arc::new(AtomicUsize::new(0));
        let filter_root = root.clone();
        let filter_matcher = Arc::clone(&self.matcher);
        let filter_ignored = Arc::clone(&ignored);

        let mut builder = WalkBuilder::new(&root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .max_depth(self.max_depth)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(rel) = relative_path(&filter_root, entry.path()) else {
                    return true;
                };
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                if filter_matcher.matches(&rel, is_dir) {
                    debug!("Ignored {rel}{}", if is_dir { "/" } else { "" });
                    filter_ignored.fetch_add(1, AtomicOrdering::Relaxed);
                    return false;
                }
                true
            });

        let mut outcome = WalkOutcome::default();

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Walk error: {err}");
                    outcome.issues.push(TraversalIssue {
                        path: error_path(&err).and_then(|p| relative_path(&root, &p)),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                debug!("Skipping symlink {}", entry.path().display());
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let Some(rel) = relative_path(&root, entry.path()) else {
                continue;
            };

            let size_bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    warn!("Cannot stat {rel}: {err}");
                    outcome.issues.push(TraversalIssue {
                        path: Some(rel),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let extension = Path::new(&rel)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            outcome.files.push(FileDescriptor {
                absolute_path: entry.path().to_path_buf(),
                relative_path: rel,
                size_bytes,
                extension,
            });
        }

        // Per-directory name order is not global path order ("a.txt" < "a/b").
        outcome.files.sort();
        outcome.ignored = ignored.load(AtomicOrdering::Relaxed);

        info!(
            "Walk finished: {} files, {} ignored, {} issues",
            outcome.files.len(),
            outcome.ignored,
            outcome.issues.len()
        );

        Ok(outcome)
    }
}

/// `/`-joined path of `path` below `root`; `None` for the root itself or paths outside it.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}
