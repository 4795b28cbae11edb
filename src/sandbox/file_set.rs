//! The set of submission files copied into every root sandbox

use anyhow::{Context, Result};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::CheckError;

/// Submission files, relative to a checkout root
#[derive(Debug, Clone)]
pub struct FileSet {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl FileSet {
    /// Paths may be absolute (under `root`) or relative to `root`
    pub fn new(root: impl Into<PathBuf>, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            root: root.into(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Every regular file under `root`, skipping hidden files and directories
    pub fn discover(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut paths = Vec::new();

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.file_name()));
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    paths.push(rel.to_path_buf());
                }
            }
        }

        Ok(Self { root, paths })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve each entry to `(source path, path relative to the root)`
    pub fn entries(&self) -> Result<Vec<(PathBuf, PathBuf)>, CheckError> {
        self.paths
            .iter()
            .map(|path| {
                let relative = if path.is_absolute() {
                    path.strip_prefix(&self.root)
                        .map(Path::to_path_buf)
                        .map_err(|_| outside_root(path))?
                } else {
                    path.clone()
                };

                let escapes = relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
                if escapes || relative.as_os_str().is_empty() {
                    return Err(outside_root(path));
                }

                Ok((self.root.join(&relative), relative))
            })
            .collect()
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn outside_root(path: &Path) -> CheckError {
    CheckError::SandboxSetup {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path is outside of the checkout root"),
    }
}
