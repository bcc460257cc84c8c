//! The three operations exposed to front ends: build, list, answer.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::AugustusError;
use crate::index::{IndexHandle, IndexManifest, IndexSnapshot, IndexStore};
use crate::ingest::chunker::Chunker;
use crate::ingest::loader::DocumentLoader;
use crate::ingest::pipeline::{Indexer, IngestReport};
use crate::llm::LanguageModel;
use crate::qa::{AnswerAssembler, AnswerResult, Retriever};
use crate::scan::{IgnoreMatcher, IgnoreMatcherBuilder, WalkError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Walk, load and chunk without embedding or writing anything.
    pub dry_run: bool,
}

/// Question answering over one folder.
pub struct Augustus {
    root: PathBuf,
    config: Config,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    store: IndexStore,
    handle: Arc<IndexHandle>,
    build_lock: TokioMutex<()>,
}

impl Augustus {
    pub fn new(
        root: impl AsRef<Path>,
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, AugustusError> {
        config
            .validate()
            .map_err(|e| AugustusError::Config(format!("{e:#}")))?;
        let chunker = Chunker::new(config.chunker_config())?;

        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|_| WalkError::InvalidRoot(root.into()))?;
        if config.model.dimensions != embedder.dimensions() {
            warn!(
                "Configured model.dimensions {} differs from embedder ({}); using the embedder",
                config.model.dimensions,
                embedder.dimensions()
            );
        }

        let store = IndexStore::new(config.index_dir_for(&root));
        info!(
            "Augustus ready for {} (index at {})",
            root.display(),
            store.path().display()
        );

        Ok(Self {
            root,
            config,
            chunker,
            embedder,
            model,
            store,
            handle: Arc::new(IndexHandle::new()),
            build_lock: TokioMutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// The published index, for callers that hold snapshots directly.
    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    /// Build (or rebuild) the index and publish it once it is saved.
    ///
    /// Builds are serialized. Until the new snapshot is published, queries
    /// keep answering from the previous one; a failed build leaves both the
    /// published snapshot and the on-disk index as they were.
    pub async fn build_index(&self, options: &BuildOptions) -> Result<IngestReport, AugustusError> {
        let _guard = self.build_lock.lock().await;
        info!(
            "{} index for {}",
            if options.dry_run { "Dry-running" } else { "Building" },
            self.root.display()
        );

        let indexer = Indexer::new(
            Arc::new(self.matcher()),
            DocumentLoader::new(self.config.max_file_size, self.config.binary_sniff_bytes),
            self.chunker.clone(),
            Arc::clone(&self.embedder),
        )
        .with_workers(self.config.effective_workers())
        .with_sample_size(self.config.sample_size);

        let output = indexer.build(&self.root, options.dry_run).await?;

        if let Some(snapshot) = output.snapshot {
            // Save and publish in one blocking task, no await between them.
            let store = self.store.clone();
            let handle = Arc::clone(&self.handle);
            tokio::task::spawn_blocking(move || {
                store.save(&snapshot)?;
                handle.publish(snapshot);
                Ok::<_, AugustusError>(())
            })
            .await??;
        }

        Ok(output.report)
    }

    /// Files in the current index, sorted by path.
    pub fn list_indexed_files(&self) -> Result<IndexManifest, AugustusError> {
        if let Some(snapshot) = self.handle.snapshot() {
            return Ok(snapshot.manifest.clone());
        }
        self.store.load_manifest()?.ok_or(AugustusError::NoIndex)
    }

    /// Answer `question` from the indexed files only.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult, AugustusError> {
        let snapshot = self.current_snapshot().await?;
        let matcher = self.matcher();
        let embedder = Arc::clone(&self.embedder);
        let model = Arc::clone(&self.model);
        let question = question.to_string();
        let top_k = self.config.top_k;
        let min_score = self.config.min_score;
        let snippet_chars = self.config.snippet_chars;

        let result = tokio::task::spawn_blocking(move || {
            let hits = Retriever::new(embedder.as_ref(), &snapshot.index)
                .with_matcher(&matcher)
                .retrieve(&question, top_k, min_score)?;
            AnswerAssembler::new(model.as_ref())
                .with_snippet_chars(snippet_chars)
                .answer(&question, &hits)
        })
        .await??;

        info!(
            "Answered ({}, {} citations)",
            if result.grounded { "grounded" } else { "no evidence" },
            result.citations.len()
        );
        Ok(result)
    }

    /// The published snapshot, loading the saved index on first use.
    async fn current_snapshot(&self) -> Result<Arc<IndexSnapshot>, AugustusError> {
        if let Some(snapshot) = self.handle.snapshot() {
            return Ok(snapshot);
        }
        let store = self.store.clone();
        let handle = Arc::clone(&self.handle);
        tokio::task::spawn_blocking(move || {
            let loaded = store.load()?.ok_or(AugustusError::NoIndex)?;
            info!(
                "Loaded saved index ({} files) from {}",
                loaded.manifest.files.len(),
                store.path().display()
            );
            Ok::<_, AugustusError>(handle.publish_if_empty(loaded))
        })
        .await?
    }

    /// Ignore rules as they stand now, with the index dir excluded when it sits under the root.
    fn matcher(&self) -> IgnoreMatcher {
        let mut builder = IgnoreMatcherBuilder::from_config(&self.root, &self.config.ignore);

        if let Ok(rel) = self.store.dir().strip_prefix(&self.root) {
            let rel = rel.to_string_lossy().replace('\\', "/");
            if !rel.is_empty() {
                builder.add(&format!("/{rel}/"));
            }
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::llm::mock::MockModel;
    use std::fs;
    use tempfile::TempDir;

    fn service(dir: &TempDir, config: Config) -> Augustus {
        Augustus::new(
            dir.path(),
            config,
            Arc::new(MockEmbedder::new(64)),
            Arc::new(MockModel::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        let result = Augustus::new(
            dir.path(),
            config,
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MockModel::default()),
        );
        assert!(matches!(result, Err(AugustusError::Config(_))));
    }

    #[tokio::test]
    async fn test_answer_without_index() {
        let dir = TempDir::new().unwrap();
        let augustus = service(&dir, Config::default());
        assert!(matches!(
            augustus.answer("anything").await,
            Err(AugustusError::NoIndex)
        ));
        assert!(matches!(
            augustus.list_indexed_files(),
            Err(AugustusError::NoIndex)
        ));
    }

    #[tokio::test]
    async fn test_saved_index_is_loaded_by_new_instance() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.md"), "Augustus answers from files").unwrap();

        let first = service(&dir, Config::default());
        first.build_index(&BuildOptions::default()).await.unwrap();
        assert!(dir.path().join(".augustus/index.db").is_file());

        let second = service(&dir, Config::default());
        assert!(!second.handle().is_published());
        let manifest = second.list_indexed_files().unwrap();
        assert_eq!(manifest.paths().collect::<Vec<_>>(), vec!["notes.md"]);

        let mut config = Config::default();
        config.min_score = 0.0;
        let third = service(&dir, config);
        let result = third.answer("augustus files").await.unwrap();
        assert!(result.grounded);
        assert!(third.handle().is_published());
    }

    #[tokio::test]
    async fn test_build_saves_and_publishes_same_snapshot() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        fs::write(dir.path().join("b.md"), "beta").unwrap();
        let augustus = service(&dir, Config::default());

        augustus.build_index(&BuildOptions::default()).await.unwrap();

        let published = augustus.handle().snapshot().unwrap();
        let saved = augustus.store().load_manifest().unwrap().unwrap();
        assert_eq!(published.manifest.paths().collect::<Vec<_>>(), vec!["a.md", "b.md"]);
        assert_eq!(saved.paths().collect::<Vec<_>>(), vec!["a.md", "b.md"]);
        assert_eq!(saved.files, published.manifest.files);
    }

    #[tokio::test]
    async fn test_custom_index_dir_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        let mut config = Config::default();
        config.index_dir = Some("cache/idx".into());

        let augustus = service(&dir, config);
        augustus.build_index(&BuildOptions::default()).await.unwrap();
        let report = augustus.build_index(&BuildOptions::default()).await.unwrap();

        assert_eq!(report.loaded, 1);
        assert!(dir.path().join("cache/idx/index.db").is_file());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        let augustus = service(&dir, Config::default());

        let report = augustus
            .build_index(&BuildOptions { dry_run: true })
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.loaded, 1);
        assert!(!augustus.store().exists());
        assert!(!augustus.handle().is_published());
    }
}
