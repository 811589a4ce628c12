// Lazy source file discovery
//
// Walks a materialized repository, pruning dependency caches, build output and
// VCS metadata, and yields the files worth extracting facts from.

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Package descriptor consulted by framework detection
pub const MANIFEST_FILE: &str = "package.json";

/// Size cap for manifests, which are parsed whole rather than scanned for facts
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Directory names that are never descended into
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "bower_components",
    "dist",
    "build",
    "out",
    "coverage",
    "vendor",
    ".git",
    ".svn",
    ".hg",
    ".next",
    ".nuxt",
    ".svelte-kit",
    ".angular",
    ".cache",
    ".turbo",
];

/// A scanned source file. `path` is relative to the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub extension: String,
    pub size: u64,
    pub content: String,
}

impl SourceFile {
    /// Build a source file from a relative path and its content
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        Self {
            size: content.len() as u64,
            path,
            extension,
            content,
        }
    }

    /// File name without directories
    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// File name without extension
    pub fn stem(&self) -> &str {
        self.path.file_stem().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// Whether this is a package manifest rather than source
    pub fn is_manifest(&self) -> bool {
        self.file_name() == MANIFEST_FILE
    }

    /// Relative path with forward slashes
    pub fn display_path(&self) -> String {
        slash_path(&self.path)
    }
}

/// Counters collected while scanning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub yielded: usize,
    pub skipped_large: usize,
    pub skipped_unreadable: usize,
    pub skipped_excluded: usize,
}

/// Source scanner configured with size and extension filters
pub struct Scanner {
    config: ScanConfig,
    excludes: Vec<glob::Pattern>,
}

impl Scanner {
    /// Create a scanner, compiling the configured exclude globs
    pub fn new(config: ScanConfig) -> Result<Self> {
        let excludes = config
            .exclude
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { config, excludes })
    }

    /// Start a lazy scan of `root`.
    ///
    /// Only an unusable root is an error; problems with individual files are
    /// counted in [`ScanStats`] and skipped.
    pub fn scan(&self, root: &Path) -> Result<SourceFiles<'_>> {
        let meta = fs::metadata(root).map_err(|e| Error::scan(root, e.to_string()))?;
        if !meta.is_dir() {
            return Err(Error::scan(root, "not a directory"));
        }
        fs::read_dir(root).map_err(|e| Error::scan(root, e.to_string()))?;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(SourceFiles {
            scanner: self,
            root: root.to_path_buf(),
            walker,
            stats: ScanStats::default(),
        })
    }

    /// Scan eagerly, returning the files and final counters
    pub fn collect(&self, root: &Path) -> Result<(Vec<SourceFile>, ScanStats)> {
        let mut files = self.scan(root)?;
        let collected: Vec<SourceFile> = files.by_ref().collect();
        Ok((collected, files.stats()))
    }

    fn is_excluded_dir(&self, name: &str, relative: &str) -> bool {
        EXCLUDED_DIRS.contains(&name) || self.matches_exclude(relative)
    }

    fn matches_exclude(&self, relative: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(relative))
    }

    fn is_wanted(&self, path: &Path) -> bool {
        if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
            return true;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .config
                .extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Iterator over the source files of one scan
pub struct SourceFiles<'a> {
    scanner: &'a Scanner,
    root: PathBuf,
    walker: walkdir::IntoIter,
    stats: ScanStats,
}

impl SourceFiles<'_> {
    /// Counters so far; final once the iterator is exhausted
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Root the scan started from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for SourceFiles<'_> {
    type Item = SourceFile;

    fn next(&mut self) -> Option<SourceFile> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    self.stats.skipped_unreadable += 1;
                    continue;
                }
            };

            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let relative_str = slash_path(relative);

            if entry.file_type().is_dir() {
                if entry.depth() > 0 {
                    let name = entry.file_name().to_string_lossy();
                    if self.scanner.is_excluded_dir(&name, &relative_str) {
                        trace!(dir = %relative_str, "pruning excluded directory");
                        self.stats.skipped_excluded += 1;
                        self.walker.skip_current_dir();
                    }
                }
                continue;
            }

            if !entry.file_type().is_file() || !self.scanner.is_wanted(entry.path()) {
                continue;
            }

            if self.scanner.matches_exclude(&relative_str) {
                self.stats.skipped_excluded += 1;
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!(file = %relative_str, error = %e, "cannot stat file");
                    self.stats.skipped_unreadable += 1;
                    continue;
                }
            };

            let is_manifest = entry.file_name() == MANIFEST_FILE;
            let limit = if is_manifest {
                MAX_MANIFEST_SIZE
            } else {
                self.scanner.config.max_file_size
            };
            if size > limit {
                debug!(
                    file = %relative_str,
                    size,
                    limit,
                    "skipping oversized file"
                );
                self.stats.skipped_large += 1;
                continue;
            }

            let content = match fs::read(entry.path()).map(String::from_utf8) {
                Ok(Ok(text)) => text,
                Ok(Err(_)) => {
                    debug!(file = %relative_str, "skipping non UTF-8 file");
                    self.stats.skipped_unreadable += 1;
                    continue;
                }
                Err(e) => {
                    debug!(file = %relative_str, error = %e, "cannot read file");
                    self.stats.skipped_unreadable += 1;
                    continue;
                }
            };

            self.stats.yielded += 1;
            let mut file = SourceFile::new(PathBuf::from(relative_str), content);
            file.size = size;
            return Some(file);
        }
    }
}

/// Render a relative path with `/` separators on every platform
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
