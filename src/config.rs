/// Configuration module for Augustus.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::index::store::INDEX_DIR_NAME;
use crate::ingest::chunker::ChunkerConfig;
use crate::ingest::loader::{DEFAULT_BINARY_SNIFF_BYTES, DEFAULT_MAX_FILE_SIZE};

/// Overrides `index_dir` when set.
pub const INDEX_DIR_ENV: &str = "AUGUSTUS_INDEX_DIR";

pub const CONFIG_FILE_NAME: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.7
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_binary_sniff_bytes() -> usize {
    DEFAULT_BINARY_SNIFF_BYTES
}

fn default_snippet_chars() -> usize {
    240
}

fn default_sample_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_override_file() -> String {
    ".augustusignore".to_string()
}

fn default_model_name() -> String {
    "mock-bag-of-words".to_string()
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// How far back from a chunk's hard end to look for a natural break.
    /// Defaults to a quarter of `chunk_size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_tolerance: Option<usize>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Retrieved chunks scoring below this are not evidence.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_binary_sniff_bytes")]
    pub binary_sniff_bytes: usize,

    /// Parallel file workers while indexing. Defaults to available parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// How many indexed paths a build report lists.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Where the index lives. Relative paths resolve against the indexed root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<String>,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct IgnoreConfig {
    /// Extra gitignore-style patterns, applied last.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub use_defaults: bool,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,

    /// Per-folder ignore file read from the indexed root.
    #[serde(default = "default_override_file")]
    pub override_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            boundary_tolerance: None,
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_file_size: default_max_file_size(),
            binary_sniff_bytes: default_binary_sniff_bytes(),
            workers: None,
            snippet_chars: default_snippet_chars(),
            sample_size: default_sample_size(),
            ignore: IgnoreConfig::default(),
            index_dir: None,
            model: ModelConfig::default(),
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            use_defaults: default_true(),
            respect_gitignore: default_true(),
            override_file: default_override_file(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields defaults; so does invalid JSON, with a warning.
    /// `AUGUSTUS_INDEX_DIR` is applied afterwards.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            match serde_json::from_str::<Config>(&data) {
                Ok(c) => {
                    info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    warn!("Invalid JSON in {}: {e}", path.display());
                    warn!("Using default configuration");
                    Self::default()
                }
            }
        } else {
            info!("{} not found, using defaults", path.display());
            Self::default()
        };

        cfg.apply_env();
        Ok(cfg)
    }

    /// Load from [`default_config_path`], or defaults when there is no config dir.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) => Self::load(&path),
            None => {
                let mut cfg = Self::default();
                cfg.apply_env();
                Ok(cfg)
            }
        }
    }

    /// Save configuration to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.top_k > 0, "top_k must be positive");
        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.min_score),
            "min_score must be within [-1, 1]"
        );
        anyhow::ensure!(self.max_file_size > 0, "max_file_size must be positive");
        anyhow::ensure!(
            self.workers.is_none_or(|w| w > 0),
            "workers must be positive"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.ignore.override_file.trim().is_empty(),
            "ignore.override_file must not be empty"
        );
        Ok(())
    }

    /// Chunking parameters derived from this config.
    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        let mut chunker = ChunkerConfig::new(self.chunk_size, self.chunk_overlap);
        if let Some(tolerance) = self.boundary_tolerance {
            chunker.boundary_tolerance = tolerance;
        }
        chunker
    }

    /// Worker count for indexing.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Directory holding the index for `root`.
    #[must_use]
    pub fn index_dir_for(&self, root: &Path) -> PathBuf {
        match &self.index_dir {
            Some(dir) => {
                let dir = Path::new(dir);
                if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    root.join(dir)
                }
            }
            None => root.join(INDEX_DIR_NAME),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(INDEX_DIR_ENV) {
            if !dir.trim().is_empty() {
                info!("Using index directory from {INDEX_DIR_ENV}: {dir}");
                self.index_dir = Some(dir);
            }
        }
    }
}

/// `<user config dir>/augustus/config.json`, when the platform has one.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("augustus").join(CONFIG_FILE_NAME))
}

// ── Tests ────────────────────────────────────────────────────────────
