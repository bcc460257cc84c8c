//! Walk → load → chunk → embed, producing a complete snapshot off to the side.
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::chunker::Chunker;
use super::loader::{DocumentLoader, SkipReason};
use crate::embedder::Embedder;
use crate::error::AugustusError;
use crate::index::{ChunkRef, FlatIndex, IndexManifest, IndexSnapshot, IndexedFile, VectorIndex};
use crate::scan::{FileDescriptor, FileWalker, IgnoreMatcher, TraversalIssue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub relative_path: String,
    pub reason: SkipReason,
}

/// What a build saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Files emitted by the walker plus entries it ignored.
    pub discovered: usize,
    pub ignored: usize,
    /// Documents that made it into the index (or would have, on a dry run).
    pub loaded: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
    pub walk_issues: Vec<TraversalIssue>,
    /// First few loaded paths in walk order.
    pub sample_paths: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct BuildOutput {
    /// `None` for dry runs.
    pub snapshot: Option<IndexSnapshot>,
    pub report: IngestReport,
}

enum FileOutcome {
    Indexed {
        file: IndexedFile,
        chunks: Vec<(ChunkRef, Vec<f32>)>,
    },
    Counted {
        relative_path: String,
        chunks: usize,
    },
    Skipped(SkippedFile),
    /// The build was abandoned before this file was embedded.
    Cancelled,
}

/// Raises the shared flag when dropped; workers check it before embedding.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }
}

/// Builds index snapshots for a folder.
pub struct Indexer {
    matcher: Arc<IgnoreMatcher>,
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    workers: usize,
    sample_size: usize,
}

impl Indexer {
    pub fn new(
        matcher: Arc<IgnoreMatcher>,
        loader: DocumentLoader,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            matcher,
            loader,
            chunker,
            embedder,
            workers: 4,
            sample_size: 5,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Build a snapshot of `root`.
    ///
    /// Nothing is published here; the caller decides what to do with the
    /// result. Dropping the returned future abandons the build.
    pub async fn build(&self, root: &Path, dry_run: bool) -> Result<BuildOutput, AugustusError> {
        let walker = FileWalker::new(Arc::clone(&self.matcher));
        let walk_root = root.to_path_buf();
        let walk = tokio::task::spawn_blocking(move || walker.walk(&walk_root)).await??;

        info!(
            "Discovered {} files ({} ignored, {} traversal issues)",
            walk.files.len(),
            walk.ignored,
            walk.issues.len()
        );

        let dimensions = self.embedder.dimensions();
        let mut index = FlatIndex::new(dimensions)?;
        let mut report = IngestReport {
            discovered: walk.discovered(),
            ignored: walk.ignored,
            walk_issues: walk.issues,
            dry_run,
            ..IngestReport::default()
        };
        let mut files = Vec::new();

        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel = CancelOnDrop(Arc::clone(&cancelled));
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(walk.files.len());
        for descriptor in walk.files {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| AugustusError::Worker(e.to_string()))?;
            let loader = self.loader.clone();
            let chunker = self.chunker.clone();
            let embedder = Arc::clone(&self.embedder);
            let cancelled = Arc::clone(&cancelled);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                process_file(
                    &descriptor,
                    &loader,
                    &chunker,
                    embedder.as_ref(),
                    dry_run,
                    &cancelled,
                )
            }));
        }

        // Awaited in walk order so the merge is deterministic.
        for handle in handles {
            match handle.await? {
                FileOutcome::Indexed { file, chunks } => {
                    report.chunks += chunks.len();
                    for (chunk, embedding) in chunks {
                        index.insert(chunk, embedding)?;
                    }
                    self.record_loaded(&mut report, &file.relative_path);
                    files.push(file);
                }
                FileOutcome::Counted {
                    relative_path,
                    chunks,
                } => {
                    report.chunks += chunks;
                    self.record_loaded(&mut report, &relative_path);
                }
                FileOutcome::Skipped(skipped) => {
                    warn!("Skipped {}: {}", skipped.relative_path, skipped.reason);
                    report.skipped.push(skipped);
                }
                FileOutcome::Cancelled => {}
            }
        }

        info!(
            "{} {} documents into {} chunks ({} skipped)",
            if dry_run { "Would index" } else { "Indexed" },
            report.loaded,
            report.chunks,
            report.skipped.len()
        );

        if dry_run {
            return Ok(BuildOutput {
                snapshot: None,
                report,
            });
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let manifest = IndexManifest {
            root: root.to_string_lossy().into_owned(),
            dimensions,
            model: self.embedder.model_name().to_string(),
            built_at: Utc::now(),
            files,
        };

        Ok(BuildOutput {
            snapshot: Some(IndexSnapshot { index, manifest }),
            report,
        })
    }

    fn record_loaded(&self, report: &mut IngestReport, relative_path: &str) {
        report.loaded += 1;
        if report.sample_paths.len() < self.sample_size {
            report.sample_paths.push(relative_path.to_string());
        }
    }
}

fn process_file(
    descriptor: &FileDescriptor,
    loader: &DocumentLoader,
    chunker: &Chunker,
    embedder: &dyn Embedder,
    dry_run: bool,
    cancelled: &AtomicBool,
) -> FileOutcome {
    if cancelled.load(AtomicOrdering::Relaxed) {
        return FileOutcome::Cancelled;
    }

    let skipped = |reason: SkipReason| {
        FileOutcome::Skipped(SkippedFile {
            relative_path: descriptor.relative_path.clone(),
            reason,
        })
    };

    let document = match loader.load(descriptor) {
        Ok(document) => document,
        Err(reason) => return skipped(reason),
    };
    let chunks = chunker.split(&document);
    debug!("{} -> {} chunks", document.relative_path, chunks.len());

    if dry_run {
        return FileOutcome::Counted {
            relative_path: document.relative_path,
            chunks: chunks.len(),
        };
    }

    if cancelled.load(AtomicOrdering::Relaxed) {
        debug!("Build abandoned before embedding {}", document.relative_path);
        return FileOutcome::Cancelled;
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        match embedder.embed_batch(&texts) {
            Ok(v) if v.len() == texts.len() => v,
            Ok(v) => {
                return skipped(SkipReason::Embedding {
                    message: format!("expected {} vectors, got {}", texts.len(), v.len()),
                });
            }
            Err(e) => {
                return skipped(SkipReason::Embedding {
                    message: e.to_string(),
                });
            }
        }
    };

    let file = IndexedFile {
        relative_path: document.relative_path.clone(),
        document_id: document.id.to_string(),
        size_bytes: document.size_bytes,
        chunks: chunks.len(),
    };
    let chunks = chunks
        .iter()
        .map(ChunkRef::from)
        .zip(embeddings)
        .collect();

    FileOutcome::Indexed { file, chunks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderError;
    use crate::embedder::mock::MockEmbedder;
    use crate::index::IndexError;
    use crate::ingest::chunker::ChunkerConfig;
    use std::fs;
    use tempfile::TempDir;

    fn indexer(embedder: Arc<dyn Embedder>) -> Indexer {
        let mut builder = IgnoreMatcher::builder();
        builder.add_defaults();
        Indexer::new(
            Arc::new(builder.build()),
            DocumentLoader::default(),
            Chunker::new(ChunkerConfig::new(50, 10)).unwrap(),
            embedder,
        )
        .with_workers(2)
    }

    fn folder() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), "Augustus indexes folders.").unwrap();
        fs::write(dir.path().join("secret.env"), "API_KEY=hunter2").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(
            dir.path().join("docs/guide.txt"),
            "First paragraph about setup.\n\nSecond paragraph about usage and more words here.",
        )
        .unwrap();
        fs::write(dir.path().join("logo.png"), [0x89, b'P', b'N', b'G', 0, 0, 1]).unwrap();
        fs::write(dir.path().join("blob.dat"), [1u8, 0, 2, 0, 3]).unwrap();
        dir
    }

    struct FailingOn(&'static str);

    impl Embedder for FailingOn {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            if text.contains(self.0) {
                Err(EmbedderError::RequestFailed("boom".into()))
            } else {
                Ok(vec![1.0, 0.0, 0.0, 0.0])
            }
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct WrongDimensions;

    impl Embedder for WrongDimensions {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(vec![1.0; 3])
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl Embedder for Counting {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(vec![1.0; 4])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[test]
    fn test_cancelled_build_skips_embedding() {
        let dir = folder();
        let descriptor = FileDescriptor {
            absolute_path: dir.path().join("README.md"),
            relative_path: "README.md".into(),
            size_bytes: 25,
            extension: "md".into(),
        };
        let embedder = Counting::default();
        let loader = DocumentLoader::default();
        let chunker = Chunker::new(ChunkerConfig::new(50, 10)).unwrap();

        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop(Arc::clone(&flag)));
        assert!(flag.load(AtomicOrdering::SeqCst));

        let outcome = process_file(&descriptor, &loader, &chunker, &embedder, false, &flag);
        assert!(matches!(outcome, FileOutcome::Cancelled));
        assert_eq!(embedder.0.load(AtomicOrdering::SeqCst), 0);

        let outcome = process_file(
            &descriptor,
            &loader,
            &chunker,
            &embedder,
            false,
            &AtomicBool::new(false),
        );
        assert!(matches!(outcome, FileOutcome::Indexed { .. }));
        assert_eq!(embedder.0.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_indexes_text_and_skips_binary() {
        let dir = folder();
        let output = indexer(Arc::new(MockEmbedder::new(32)))
            .build(dir.path(), false)
            .await
            .unwrap();

        let report = &output.report;
        assert_eq!(report.loaded, 2);
        assert_eq!(report.sample_paths, vec!["README.md", "docs/guide.txt"]);
        assert_eq!(report.ignored, 2, "secret.env and logo.png");
        assert_eq!(report.discovered, 5);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].relative_path, "blob.dat");
        assert_eq!(report.skipped[0].reason, SkipReason::Binary);

        let snapshot = output.snapshot.unwrap();
        assert_eq!(snapshot.index.len(), report.chunks);
        assert_eq!(
            snapshot.manifest.paths().collect::<Vec<_>>(),
            vec!["README.md", "docs/guide.txt"]
        );
        assert!(
            snapshot
                .index
                .entries()
                .all(|e| e.chunk.source_path != "blob.dat")
        );
    }

    #[tokio::test]
    async fn test_two_builds_are_identical() {
        let dir = folder();
        let indexer = indexer(Arc::new(MockEmbedder::new(32)));
        let a = indexer.build(dir.path(), false).await.unwrap();
        let b = indexer.build(dir.path(), false).await.unwrap();

        let ids = |o: &BuildOutput| {
            o.snapshot
                .as_ref()
                .unwrap()
                .index
                .entries()
                .map(|e| e.chunk.chunk_id.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.report, b.report);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_snapshot() {
        let dir = folder();
        let full = indexer(Arc::new(MockEmbedder::new(32)))
            .build(dir.path(), false)
            .await
            .unwrap();
        let dry = indexer(Arc::new(MockEmbedder::new(32)))
            .build(dir.path(), true)
            .await
            .unwrap();

        assert!(dry.snapshot.is_none());
        assert!(dry.report.dry_run);
        assert_eq!(dry.report.loaded, full.report.loaded);
        assert_eq!(dry.report.chunks, full.report.chunks);
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_file() {
        let dir = folder();
        let output = indexer(Arc::new(FailingOn("Augustus")))
            .build(dir.path(), false)
            .await
            .unwrap();

        assert_eq!(output.report.loaded, 1);
        assert!(output.report.skipped.iter().any(|s| {
            s.relative_path == "README.md" && matches!(s.reason, SkipReason::Embedding { .. })
        }));
        let snapshot = output.snapshot.unwrap();
        assert!(!snapshot.manifest.contains("README.md"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let dir = folder();
        let err = indexer(Arc::new(WrongDimensions))
            .build(dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AugustusError::Index(IndexError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = indexer(Arc::new(MockEmbedder::new(8)))
            .build(&dir.path().join("nope"), false)
            .await;
        assert!(matches!(result, Err(AugustusError::Walk(_))));
    }

    #[tokio::test]
    async fn test_sample_size_limits_paths() {
        let dir = TempDir::new().unwrap();
        for i in 0..8 {
            fs::write(dir.path().join(format!("n{i}.md")), format!("note {i}")).unwrap();
        }
        let output = indexer(Arc::new(MockEmbedder::new(8)))
            .with_sample_size(3)
            .build(dir.path(), false)
            .await
            .unwrap();
        assert_eq!(output.report.loaded, 8);
        assert_eq!(output.report.sample_paths, vec!["n0.md", "n1.md", "n2.md"]);
    }
}
