//! File collection: resolves `[[files]]` rules into a staged install tree

use crate::error::{SetupError, SetupResult};
use crate::manifest::{normalize_rel, FileEntry};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single file staged for installation
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Install-relative destination path (forward slashes)
    pub dest: String,
    /// File contents
    pub contents: Vec<u8>,
    /// Unix permission bits
    pub mode: u32,
    /// Leave an existing destination file in place at install time
    pub keep_existing: bool,
}

/// The staged install tree produced by collection
#[derive(Debug, Default)]
pub struct StagedTree {
    files: Vec<StagedFile>,
    total_size: u64,
}

impl StagedTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a staged file. A duplicate destination replaces the earlier
    /// file and returns `true` (later entries win).
    pub fn add(&mut self, file: StagedFile) -> bool {
        if let Some(existing) = self.files.iter_mut().find(|f| f.dest == file.dest) {
            self.total_size -= existing.contents.len() as u64;
            self.total_size += file.contents.len() as u64;
            *existing = file;
            true
        } else {
            self.total_size += file.contents.len() as u64;
            self.files.push(file);
            false
        }
    }

    /// All staged files, in staging order
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Look up a staged file by destination path
    pub fn find(&self, dest: &str) -> Option<&StagedFile> {
        self.files.iter().find(|f| f.dest == dest)
    }

    /// Whether a destination path is staged
    pub fn contains(&self, dest: &str) -> bool {
        self.find(dest).is_some()
    }

    /// Number of staged files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total uncompressed size
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Convert to the owned file list
    pub fn into_files(self) -> Vec<StagedFile> {
        self.files
    }
}

/// A matched source file waiting to be read
struct PlannedFile {
    abs: PathBuf,
    dest: String,
    keep_existing: bool,
}

/// Resolves `[[files]]` rules against a source root
pub struct FileCollector {
    /// Root directory glob patterns are relative to
    source_root: PathBuf,
    /// Patterns to exclude while walking
    exclude_patterns: Vec<String>,
}

impl FileCollector {
    /// Create a collector for a source root
    pub fn new(source_root: impl AsRef<Path>) -> Self {
        Self {
            source_root: source_root.as_ref().to_path_buf(),
            exclude_patterns: vec![
                ".git".to_string(),
                ".gitignore".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
            ],
        }
    }

    /// Add patterns to exclude
    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.exclude_patterns
            .extend(patterns.iter().map(|s| s.to_string()));
        self
    }

    /// Stage every file matched by the given rules
    pub fn collect(&self, entries: &[FileEntry]) -> SetupResult<StagedTree> {
        if !self.source_root.exists() {
            return Err(SetupError::SourceNotFound(self.source_root.clone()));
        }

        let mut planned = Vec::new();
        for entry in entries {
            let count = self.plan_entry(entry, &mut planned)?;
            tracing::debug!(
                "Pattern '{}' matched {} path(s) -> {}",
                entry.source,
                count,
                if entry.dest.is_empty() {
                    "."
                } else {
                    entry.dest.as_str()
                }
            );
        }

        let staged = planned
            .par_iter()
            .map(|p| -> SetupResult<StagedFile> {
                let metadata = fs::metadata(&p.abs)?;
                let contents = fs::read(&p.abs)?;
                Ok(StagedFile {
                    dest: p.dest.clone(),
                    mode: file_mode(&metadata),
                    keep_existing: p.keep_existing,
                    contents,
                })
            })
            .collect::<SetupResult<Vec<_>>>()?;

        let mut tree = StagedTree::new();
        for file in staged {
            let dest = file.dest.clone();
            if tree.add(file) {
                tracing::warn!("Duplicate destination '{}': later entry wins", dest);
            }
        }

        if tree.is_empty() {
            return Err(SetupError::Collect(format!(
                "No files staged from: {}",
                self.source_root.display()
            )));
        }

        tracing::info!(
            "Staged {} files, {} bytes total",
            tree.len(),
            tree.total_size()
        );

        Ok(tree)
    }

    /// Resolve one rule's glob and queue its files; returns the match count
    fn plan_entry(&self, entry: &FileEntry, planned: &mut Vec<PlannedFile>) -> SetupResult<usize> {
        let dest = normalize_rel(&entry.dest).ok_or_else(|| {
            SetupError::Collect(format!("Destination escapes the install dir: {}", entry.dest))
        })?;

        let pattern = if Path::new(&entry.source).is_absolute() {
            entry.source.clone()
        } else {
            self.source_root
                .join(&entry.source)
                .to_string_lossy()
                .replace('\\', "/")
        };

        let paths = glob::glob(&pattern)
            .map_err(|e| SetupError::Collect(format!("Bad pattern '{}': {}", entry.source, e)))?;

        let mut count = 0;
        for path in paths {
            let path = path.map_err(|e| SetupError::Collect(e.to_string()))?;
            count += 1;

            if path.is_dir() {
                if !entry.recursive {
                    tracing::debug!("Skipping directory (recursive = false): {}", path.display());
                    continue;
                }
                self.plan_dir(&path, &dest, entry, planned)?;
            } else {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or_else(|| {
                        SetupError::Collect(format!("Unusable source path: {}", path.display()))
                    })?;
                planned.push(PlannedFile {
                    abs: path,
                    dest: join_dest(&dest, &name),
                    keep_existing: !entry.overwrite,
                });
            }
        }

        if count == 0 {
            return Err(SetupError::NoFilesMatched(entry.source.clone()));
        }
        Ok(count)
    }

    /// Walk a matched directory, preserving its name and relative structure
    fn plan_dir(
        &self,
        dir: &Path,
        dest: &str,
        entry: &FileEntry,
        planned: &mut Vec<PlannedFile>,
    ) -> SetupResult<()> {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                SetupError::Collect(format!("Unusable source directory: {}", dir.display()))
            })?;
        let dir_dest = join_dest(dest, &dir_name);

        for walked in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !self.should_exclude(e, &entry.exclude))
        {
            let walked = walked.map_err(|e| SetupError::Collect(e.to_string()))?;
            if !walked.file_type().is_file() {
                continue;
            }

            let relative = walked
                .path()
                .strip_prefix(dir)
                .map_err(|e| SetupError::Collect(e.to_string()))?;
            let relative_str = relative.to_string_lossy().replace('\\', "/");

            planned.push(PlannedFile {
                abs: walked.path().to_path_buf(),
                dest: join_dest(&dir_dest, &relative_str),
                keep_existing: !entry.overwrite,
            });
        }
        Ok(())
    }

    /// Check if an entry should be excluded
    fn should_exclude(&self, entry: &walkdir::DirEntry, extra: &[String]) -> bool {
        let name = entry.file_name().to_string_lossy();

        for pattern in self.exclude_patterns.iter().chain(extra.iter()) {
            if let Some(suffix) = pattern.strip_prefix('*') {
                // Wildcard pattern (e.g., "*.pdb")
                if name.ends_with(suffix) {
                    return true;
                }
            } else if name == pattern.as_str() {
                return true;
            }
        }

        false
    }
}

/// Join an install-relative directory and a relative file path
fn join_dest(dest: &str, rel: &str) -> String {
    if dest.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", dest, rel)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o755
}
