//! Per-check invocation context
//!
//! Everything a check body can touch: its working area, its diagnostic log
//! and data, the after-check hooks, and the process harness entry points.

use anyhow::Context as _;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::config::EngineConfig;
use crate::core::utils::sha256_hex;
use crate::error::CheckError;
use crate::runner::{self, ProcessHandle};

/// Callback run after the check body, before the result is finalized
pub type AfterHook = Box<dyn FnOnce(&CheckContext) -> Result<(), CheckError> + Send>;

/// Cheaply cloneable handle to one check's execution state
#[derive(Clone)]
pub struct CheckContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    name: String,
    root: PathBuf,
    checks_dir: Option<PathBuf>,
    config: EngineConfig,
    log: Mutex<Vec<String>>,
    data: Mutex<BTreeMap<String, Value>>,
    after: Mutex<Vec<AfterHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CheckContext {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        checks_dir: Option<PathBuf>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                root: root.into(),
                checks_dir,
                config,
                log: Mutex::new(Vec::new()),
                data: Mutex::new(BTreeMap::new()),
                after: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Name of the check being executed
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Execution root (the check's working area)
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Append a line to the check's diagnostic log
    pub fn log(&self, line: impl Into<String>) {
        lock(&self.inner.log).push(line.into());
    }

    /// Attach a key/value pair to the check's result
    pub fn set_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        lock(&self.inner.data).insert(key.into(), value.into());
    }

    /// Register a callback to run once the body has finished
    pub fn after_check(&self, hook: AfterHook) {
        lock(&self.inner.after).push(hook);
    }

    /// Spawn `command` in the working area
    pub async fn run(&self, command: &str) -> Result<ProcessHandle, CheckError> {
        runner::spawn(self, command, &BTreeMap::new()).await
    }

    /// Spawn `command` in the working area with extra environment variables
    pub async fn run_with_env(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ProcessHandle, CheckError> {
        runner::spawn(self, command, env).await
    }

    /// Assert that a file exists in the working area
    pub fn exists(&self, path: &str) -> Result<(), CheckError> {
        self.log(format!("checking that {} exists...", path));
        if self.root().join(path).exists() {
            Ok(())
        } else {
            Err(CheckError::failure(format!("{} not found", path)))
        }
    }

    /// Copy files from the checks directory into the working area
    pub fn include(&self, names: &[String]) -> Result<(), CheckError> {
        let checks_dir = self
            .inner
            .checks_dir
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no checks directory to include files from"))?;

        for name in names {
            let source = checks_dir.join(name);
            let dest = self.root().join(name);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            std::fs::copy(&source, &dest)
                .with_context(|| format!("Failed to include {:?}", source))?;
            debug!("Included {:?} into {:?}", source, dest);
        }
        Ok(())
    }

    /// SHA-256 hex digest of a file in the working area
    pub fn hash(&self, path: &str) -> Result<String, CheckError> {
        match std::fs::read(self.root().join(path)) {
            Ok(bytes) => Ok(sha256_hex(&bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckError::failure(format!("{} not found", path)))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("Failed to read {}", path))
                .into()),
        }
    }

    /// Run every registered after-check hook, returning the first failure
    pub(crate) fn run_after_hooks(&self) -> Result<(), CheckError> {
        let hooks: Vec<AfterHook> = std::mem::take(&mut *lock(&self.inner.after));
        let mut first_error = None;
        for hook in hooks {
            if let Err(err) = hook(self) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.inner.log))
    }

    pub(crate) fn take_data(&self) -> BTreeMap<String, Value> {
        std::mem::take(&mut *lock(&self.inner.data))
    }
}
