//! Isolated working directory for one check
//!
//! A `Sandbox` owns a fresh temporary directory. Dropping it removes the
//! directory and everything the check wrote there, on every exit path.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::FileSet;
use crate::error::CheckError;

/// Scoped working area, removed on drop
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    root: PathBuf,
}

impl Sandbox {
    /// Create a working area populated with the submission's files
    pub fn enter(files: &FileSet) -> Result<Self, CheckError> {
        let sandbox = Self::create()?;

        for (source, relative) in files.entries()? {
            let dest = sandbox.root.join(&relative);
            let metadata = fs::metadata(&source).map_err(|err| setup_error(&source, err))?;
            if metadata.is_dir() {
                copy_tree(&source, &dest)?;
            } else if metadata.is_file() {
                copy_file(&source, &dest)?;
            } else {
                debug!("Skipping special file {:?}", source);
            }
        }

        debug!(
            "Entered working area {:?} with {} file(s)",
            sandbox.root,
            files.len()
        );
        Ok(sandbox)
    }

    /// Create a working area holding a copy of another one's contents
    pub fn fork(seed: &Sandbox) -> Result<Self, CheckError> {
        let sandbox = Self::create()?;
        copy_tree(seed.root(), &sandbox.root)?;

        debug!("Forked working area {:?} from {:?}", sandbox.root, seed.root());
        Ok(sandbox)
    }

    fn create() -> Result<Self, CheckError> {
        let dir = tempfile::Builder::new()
            .prefix("grader-")
            .tempdir()
            .map_err(|err| setup_error(&std::env::temp_dir(), err))?;
        // Canonical so leak reports (which print resolved paths) compare equal
        let root = dir
            .path()
            .canonicalize()
            .map_err(|err| setup_error(dir.path(), err))?;

        Ok(Self { dir, root })
    }

    /// Directory the check executes in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove the working area now, reporting failures instead of ignoring them
    pub fn close(self) {
        let path = self.root;
        if let Err(err) = self.dir.close() {
            warn!("Failed to remove working area {:?}: {}", path, err);
        }
    }
}

fn setup_error(path: &Path, source: std::io::Error) -> CheckError {
    CheckError::SandboxSetup {
        path: path.to_path_buf(),
        source,
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), CheckError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| setup_error(parent, err))?;
    }
    fs::copy(source, dest).map_err(|err| setup_error(source, err))?;
    Ok(())
}

/// Copy a directory tree without following links
///
/// Symlinks are recreated as links. FIFOs, sockets and device files are
/// skipped, since opening them can block or never reach EOF.
fn copy_tree(source_dir: &Path, dest_dir: &Path) -> Result<(), CheckError> {
    fs::create_dir_all(dest_dir).map_err(|err| setup_error(dest_dir, err))?;

    for entry in WalkDir::new(source_dir).min_depth(1) {
        let entry = entry.map_err(|err| setup_error(source_dir, err.into()))?;
        let relative = match entry.path().strip_prefix(source_dir) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let dest = dest_dir.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(|err| setup_error(&dest, err))?;
        } else if file_type.is_file() {
            copy_file(entry.path(), &dest)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|err| setup_error(entry.path(), err))?;
            symlink(&target, &dest).map_err(|err| setup_error(&dest, err))?;
        } else {
            debug!("Skipping special file {:?}", entry.path());
        }
    }

    Ok(())
}
