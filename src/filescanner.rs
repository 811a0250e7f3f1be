use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::fstools::{classify_file, DirEntryCategory};

pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "mkv"];

pub fn is_video(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Finds video files under a directory.
pub struct FileScanner {
    pub recursive: bool,
    /// Directory names never descended into, such as the output subdirectory.
    pub skip_dirs: Vec<String>,
}

impl FileScanner {
    pub fn new(recursive: bool) -> Self {
        FileScanner { recursive, skip_dirs: vec![] }
    }

    pub fn skip_dir(mut self, name: &str) -> Self {
        self.skip_dirs.push(String::from(name));
        self
    }

    pub fn scan(&self, dirpath: &Path) -> Vec<PathBuf> {
        let mut found = vec![];
        let mut dirpaths = vec![dirpath.to_path_buf()];
        while let Some(current_dir) = dirpaths.pop() {
            let entries = match fs::read_dir(&current_dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(dir = %current_dir.display(), "unable to read directory: {}", err);
                    continue;
                },
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let Ok(ft) = entry.file_type() else { continue };
                let path = entry.path();
                if ft.is_file() && is_video(&path) {
                    found.push(path);
                } else if ft.is_dir() && self.recursive && !self.skipped(&path) {
                    dirpaths.push(path);
                }
            }
        }
        found.sort();
        found
    }

    fn skipped(&self, dir: &Path) -> bool {
        match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.skip_dirs.iter().any(|s| s == name),
            None => false,
        }
    }

    /// Expands files and directories into a sorted, de-duplicated list of
    /// absolute video paths. Files named explicitly are kept whatever their
    /// extension.
    pub fn collect(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, RunnerError> {
        let mut files = BTreeSet::new();
        for input in inputs {
            match classify_file(input) {
                DirEntryCategory::RegularFile => {
                    files.insert(fs::canonicalize(input)?);
                },
                DirEntryCategory::Directory => {
                    let dir = fs::canonicalize(input)?;
                    let found = self.scan(&dir);
                    debug!(dir = %dir.display(), count = found.len(), "scanned directory");
                    files.extend(found);
                },
                DirEntryCategory::DoesNotExist => {
                    return Err(RunnerError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} does not exist", input.display()))));
                },
                DirEntryCategory::Unknown => warn!(path = %input.display(), "skipping unclassifiable path"),
            }
        }
        Ok(files.into_iter().collect())
    }
}
