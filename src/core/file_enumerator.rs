use ignore::{DirEntry, WalkBuilder};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/*
 * This module enumerates the candidate files of a project directory. It walks the
 * directory with the `ignore` crate, prunes excluded directories by path segment,
 * keeps files whose names end in an allowed suffix, and tags each with its size.
 * Files above the size limit are still yielded; deciding what to do with them is up
 * to the tree builder.
 */

/*
 * Defines custom error types for file system operations. Only whole-walk failures
 * are surfaced; problems with single entries are logged and the entry is skipped.
 */
#[derive(Debug)]
pub enum FileSystemError {
    Io(io::Error),
    IgnoreError(ignore::Error),
    InvalidPath(PathBuf),
}

impl From<io::Error> for FileSystemError {
    fn from(err: io::Error) -> Self {
        FileSystemError::Io(err)
    }
}

impl From<ignore::Error> for FileSystemError {
    fn from(err: ignore::Error) -> Self {
        FileSystemError::IgnoreError(err)
    }
}

impl std::fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSystemError::Io(e) => write!(f, "I/O error: {e}"),
            FileSystemError::IgnoreError(e) => write!(f, "Ignore pattern processing error: {e}"),
            FileSystemError::InvalidPath(p) => write!(f, "Invalid path: {p:?}"),
        }
    }
}

impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileSystemError::Io(e) => Some(e),
            FileSystemError::IgnoreError(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FileSystemError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/*
 * Inclusion rules. Suffixes and directory names are expected in lower case; matching
 * is case-insensitive.
 */
#[derive(Debug, Clone, Default)]
pub struct EnumerationRules {
    pub allowed_suffixes: Vec<String>,
    pub excluded_directories: HashSet<String>,
    pub max_file_size: u64,
    pub respect_ignore_files: bool,
}

impl EnumerationRules {
    pub fn allows(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.allowed_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }

    pub fn exceeds_size_limit(&self, size_bytes: u64) -> bool {
        size_bytes > self.max_file_size
    }

    fn is_excluded_directory(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_some_and(|ft| ft.is_dir())
            && self
                .excluded_directories
                .contains(&entry.file_name().to_string_lossy().to_lowercase())
    }
}

pub trait FileEnumeratorOperations: Send + Sync {
    /*
     * Produces the candidate files below `root` lazily, in a stable order (entries of
     * each directory sorted by file name).
     */
    fn enumerate(
        &self,
        root: &Path,
        rules: &EnumerationRules,
    ) -> Result<Box<dyn Iterator<Item = CandidateFile>>>;
}

pub struct CoreFileEnumerator {}

impl CoreFileEnumerator {
    pub fn new() -> Self {
        CoreFileEnumerator {}
    }
}

impl Default for CoreFileEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FileEnumeratorOperations for CoreFileEnumerator {
    fn enumerate(
        &self,
        root: &Path,
        rules: &EnumerationRules,
    ) -> Result<Box<dyn Iterator<Item = CandidateFile>>> {
        if !root.is_dir() {
            return Err(FileSystemError::InvalidPath(root.to_path_buf()));
        }
        log::debug!("FileEnumerator: Enumerating {root:?}.");

        let prune_rules = rules.clone();
        let mut walker_builder = WalkBuilder::new(root);
        walker_builder
            .standard_filters(false)
            .hidden(false)
            .parents(rules.respect_ignore_files)
            .git_ignore(rules.respect_ignore_files)
            .git_exclude(rules.respect_ignore_files)
            .ignore(rules.respect_ignore_files)
            .git_global(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| !prune_rules.is_excluded_directory(entry));

        let rules = rules.clone();
        let files = walker_builder
            .build()
            .filter_map(|entry_result| match entry_result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("FileEnumerator: Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(move |entry| rules.allows(entry.path()))
            .filter_map(|entry| match entry.metadata() {
                Ok(metadata) => Some(CandidateFile {
                    path: entry.into_path(),
                    size_bytes: metadata.len(),
                }),
                Err(e) => {
                    log::warn!("FileEnumerator: Skipping {:?}, no metadata: {e}", entry.path());
                    None
                }
            });
        Ok(Box::new(files))
    }
}
