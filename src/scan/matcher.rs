//! Gitignore-style path matching.
//!
//! Patterns are evaluated in order and the last one that matches a path
//! decides whether it is ignored. A path below an ignored directory is always
//! ignored, matching git's rule that a file cannot be re-included once one of
//! its parents is excluded.
use std::fs;
use std::io;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::IgnoreConfig;

/// Patterns applied to every walk unless defaults are disabled.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git/",
    ".gitignore",
    ".gitattributes",
    ".hg/",
    ".svn/",
    // Dependencies
    "node_modules/",
    "venv/",
    "env/",
    ".venv/",
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    // Build output
    "dist/",
    "build/",
    "*.egg-info/",
    "target/",
    "*.o",
    "*.so",
    "*.dylib",
    "*.dll",
    // Editors
    ".vscode/",
    ".idea/",
    "*.swp",
    "*.swo",
    ".DS_Store",
    // Known binary media
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.mp4",
    "*.mp3",
    // Secrets
    ".env",
    ".env.*",
    "*.env",
    "*.key",
    "*.pem",
    "credentials.json",
    // Our own index and ignore file
    ".augustus/",
    ".augustusignore",
];

/// Why a pattern line was dropped.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("pattern has no path component")]
    Empty,

    #[error("invalid glob: {0}")]
    Glob(#[from] globset::Error),
}

/// A pattern that could not be compiled, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPattern {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct Rule {
    source: String,
    glob: GlobMatcher,
    negated: bool,
    dir_only: bool,
}

impl Rule {
    /// Parse one gitignore line. `Ok(None)` means blank or comment.
    fn parse(line: &str) -> Result<Option<Self>, PatternError> {
        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let (negated, body) = if let Some(rest) = trimmed.strip_prefix('!') {
            (true, rest)
        } else if trimmed.starts_with("\\!") || trimmed.starts_with("\\#") {
            (false, &trimmed[1..])
        } else {
            (false, trimmed)
        };

        let (dir_only, body) = match body.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };

        // A slash anywhere but the end anchors the pattern to the root.
        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return Err(PatternError::Empty);
        }

        let glob = if anchored {
            body.to_string()
        } else {
            format!("**/{body}")
        };

        let glob = GlobBuilder::new(&glob)
            .literal_separator(true)
            .backslash_escape(true)
            .build()?
            .compile_matcher();

        Ok(Some(Self {
            source: line.trim().to_string(),
            glob,
            negated,
            dir_only,
        }))
    }

    fn applies(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        self.glob.is_match(path)
    }
}

/// Compiled, ordered ignore rules.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
    rejected: Vec<RejectedPattern>,
}

impl IgnoreMatcher {
    /// Start an empty builder.
    #[must_use]
    pub fn builder() -> IgnoreMatcherBuilder {
        IgnoreMatcherBuilder::default()
    }

    /// Build a matcher from defaults, root-level ignore files, and explicit
    /// patterns, in that precedence order (later wins).
    pub fn from_config(root: &Path, config: &IgnoreConfig) -> Self {
        IgnoreMatcherBuilder::from_config(root, config).build()
    }

    /// Whether `relative_path` (`/`-separated, relative to the root) is ignored.
    #[must_use]
    pub fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        let path = normalize(relative_path);
        if path.is_empty() {
            return false;
        }

        for (idx, _) in path.match_indices('/') {
            if self.decide(&path[..idx], true) == Some(true) {
                return true;
            }
        }

        self.decide(&path, is_dir).unwrap_or(false)
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compiled pattern lines, in evaluation order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.source.as_str())
    }

    /// Patterns that were dropped while building.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedPattern] {
        &self.rejected
    }

    fn decide(&self, path: &str, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.applies(path, is_dir))
            .map(|rule| !rule.negated)
    }
}

/// Accumulates pattern lines; malformed lines are dropped with a warning.
#[derive(Debug, Default)]
pub struct IgnoreMatcherBuilder {
    rules: Vec<Rule>,
    rejected: Vec<RejectedPattern>,
}

impl IgnoreMatcherBuilder {
    /// A builder preloaded the way [`IgnoreMatcher::from_config`] loads it.
    pub fn from_config(root: &Path, config: &IgnoreConfig) -> Self {
        let mut builder = Self::default();
        if config.use_defaults {
            builder.add_defaults();
        }
        if config.respect_gitignore {
            builder.add_file(&root.join(".gitignore"));
        }
        if !config.override_file.is_empty() {
            builder.add_file(&root.join(&config.override_file));
        }
        for pattern in &config.patterns {
            builder.add(pattern);
        }
        builder
    }

    /// Append the built-in defaults.
    pub fn add_defaults(&mut self) -> &mut Self {
        for pattern in DEFAULT_IGNORE_PATTERNS {
            self.add(pattern);
        }
        self
    }

    /// Append a single gitignore line.
    pub fn add(&mut self, line: &str) -> &mut Self {
        match Rule::parse(line) {
            Ok(Some(rule)) => self.rules.push(rule),
            Ok(None) => {}
            Err(e) => {
                warn!("Ignoring malformed pattern {line:?}: {e}");
                self.rejected.push(RejectedPattern {
                    pattern: line.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        self
    }

    /// Append every line of an ignore file. A missing file is not an error.
    pub fn add_file(&mut self, path: &Path) -> &mut Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loading ignore patterns from {}", path.display());
                for line in content.lines() {
                    self.add(line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read ignore file {}: {e}", path.display()),
        }
        self
    }

    #[must_use]
    pub fn build(self) -> IgnoreMatcher {
        IgnoreMatcher {
            rules: self.rules,
            rejected: self.rejected,
        }
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches("./").trim_matches('/');
    path.to_string()
}
