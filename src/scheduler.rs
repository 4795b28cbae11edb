//! Scheduler - orders checks, runs them in working areas, propagates failure
//!
//! Checks run one at a time in registration order, except that a
//! prerequisite always runs before its dependents. A check whose
//! prerequisite failed or was skipped is itself skipped without running.

use anyhow::anyhow;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{get_config, EngineConfig};
use crate::context::CheckContext;
use crate::core::{Cause, CheckResult};
use crate::error::{CheckError, SuiteError};
use crate::registry::{Check, Registry};
use crate::sandbox::{FileSet, Sandbox};

/// Runs a validated registry against one submission
pub struct Scheduler {
    registry: Registry,
    files: FileSet,
    checks_dir: Option<PathBuf>,
    config: EngineConfig,
}

impl Scheduler {
    /// Fails fast if the registry is malformed
    pub fn new(registry: Registry, files: FileSet) -> Result<Self, SuiteError> {
        registry.validate()?;
        Ok(Self {
            registry,
            files,
            checks_dir: None,
            config: get_config().clone(),
        })
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory `include` copies files from
    pub fn with_checks_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checks_dir = Some(dir.into());
        self
    }

    /// Run the requested checks (all when `targets` is empty) and their
    /// prerequisites, returning one result per check in execution order
    pub async fn run(&self, targets: &[String]) -> Result<Vec<CheckResult>, SuiteError> {
        let order = self.plan(targets)?;

        // Planned dependents per prerequisite; a seed is closed once the
        // count drops to zero
        let mut pending: HashMap<&str, usize> = HashMap::new();
        for &idx in &order {
            if let Some(prerequisite) = self.registry.at(idx).prerequisite() {
                *pending.entry(prerequisite).or_default() += 1;
            }
        }

        let mut outcomes: HashMap<&str, Option<bool>> = HashMap::new();
        let mut seeds: HashMap<&str, Sandbox> = HashMap::new();
        let mut results = Vec::with_capacity(order.len());

        for idx in order {
            let check = self.registry.at(idx);

            let result = match check.prerequisite() {
                Some(prerequisite) if outcomes.get(prerequisite) != Some(&Some(true)) => {
                    info!(
                        "Skipping check {} because {} did not pass",
                        check.name(),
                        prerequisite
                    );
                    skipped(check, prerequisite)
                }
                prerequisite => {
                    let seed = prerequisite.and_then(|name| seeds.get(name));
                    let (result, sandbox) = self.execute(check, seed).await;
                    if let Some(sandbox) = sandbox {
                        if result.is_passed() && pending.contains_key(check.name()) {
                            seeds.insert(check.name(), sandbox);
                        } else {
                            sandbox.close();
                        }
                    }
                    result
                }
            };

            if let Some(prerequisite) = check.prerequisite() {
                if let Some(left) = pending.get_mut(prerequisite) {
                    *left -= 1;
                    if *left == 0 {
                        if let Some(seed) = seeds.remove(prerequisite) {
                            seed.close();
                        }
                    }
                }
            }

            outcomes.insert(check.name(), result.passed);
            results.push(result);
        }

        for (_, sandbox) in seeds.drain() {
            sandbox.close();
        }

        Ok(results)
    }

    /// Execution order: registration order, prerequisites pulled forward
    fn plan(&self, targets: &[String]) -> Result<Vec<usize>, SuiteError> {
        let selected = if targets.is_empty() {
            None
        } else {
            let mut selected = HashSet::new();
            for target in targets {
                let mut idx = self.registry.position(target).ok_or_else(|| {
                    SuiteError::UnknownTarget {
                        name: target.clone(),
                        suggestion: self.registry.closest_name(target),
                    }
                })?;
                // Pull in the whole prerequisite chain
                while selected.insert(idx) {
                    match self
                        .registry
                        .at(idx)
                        .prerequisite()
                        .and_then(|name| self.registry.position(name))
                    {
                        Some(parent) => idx = parent,
                        None => break,
                    }
                }
            }
            Some(selected)
        };

        let mut visited = vec![false; self.registry.len()];
        let mut order = Vec::with_capacity(self.registry.len());
        for idx in 0..self.registry.len() {
            let wanted = selected.as_ref().map_or(true, |s| s.contains(&idx));
            if wanted {
                self.visit(idx, &mut visited, &mut order);
            }
        }
        Ok(order)
    }

    fn visit(&self, idx: usize, visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[idx] {
            return;
        }
        visited[idx] = true;
        if let Some(parent) = self
            .registry
            .at(idx)
            .prerequisite()
            .and_then(|name| self.registry.position(name))
        {
            self.visit(parent, visited, order);
        }
        order.push(idx);
    }

    /// Run one check in a fresh working area
    async fn execute(
        &self,
        check: &Check,
        seed: Option<&Sandbox>,
    ) -> (CheckResult, Option<Sandbox>) {
        info!("Running check {}", check.name());

        let sandbox = match seed {
            Some(seed) => Sandbox::fork(seed),
            None => Sandbox::enter(&self.files),
        };
        let sandbox = match sandbox {
            Ok(sandbox) => sandbox,
            Err(err) => {
                warn!("Could not prepare working area for {}: {}", check.name(), err);
                return (finish(check, Err(err), Vec::new(), Default::default()), None);
            }
        };

        let ctx = CheckContext::new(
            check.name(),
            sandbox.root(),
            self.checks_dir.clone(),
            self.config.clone(),
        );
        let outcome = self.invoke(check, &ctx).await;
        // Hooks always run; a body failure takes precedence over theirs
        let hooks = ctx.run_after_hooks();
        let outcome = outcome.and(hooks);

        let result = finish(check, outcome, ctx.take_log(), ctx.take_data());
        info!("Check {} {}", check.name(), result.verdict());
        (result, Some(sandbox))
    }

    /// Run the body in its own task, bounded by the check timeout
    async fn invoke(&self, check: &Check, ctx: &CheckContext) -> Result<(), CheckError> {
        let body = check.body();
        let task_ctx = ctx.clone();
        let mut task = tokio::spawn(async move { body.run(task_ctx).await });

        match tokio::time::timeout(self.config.check_timeout(), &mut task).await {
            Ok(Ok(outcome)) => {
                if let Err(CheckError::ProcessClosed) = &outcome {
                    warn!("Check {} used a process after it exited", check.name());
                }
                outcome
            }
            Ok(Err(err)) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                warn!("Check {} panicked: {}", check.name(), message);
                Err(CheckError::Crashed(message))
            }
            Ok(Err(err)) => Err(CheckError::Other(anyhow!(err))),
            Err(_) => {
                // Dropping the task drops its process handles, which kill
                // their process groups.
                task.abort();
                let _ = task.await;
                Err(CheckError::CheckTimeout {
                    seconds: self.config.check_timeout_secs,
                })
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn skipped(check: &Check, prerequisite: &str) -> CheckResult {
    CheckResult {
        name: check.name().to_string(),
        description: check.description().to_string(),
        passed: None,
        cause: Some(Cause::new(format!(
            "can't check until \"{}\" passes",
            prerequisite
        ))),
        log: Vec::new(),
        data: None,
        dependency: Some(prerequisite.to_string()),
    }
}

fn finish(
    check: &Check,
    outcome: Result<(), CheckError>,
    log: Vec<String>,
    mut data: BTreeMap<String, Value>,
) -> CheckResult {
    let (passed, cause) = match outcome {
        Ok(()) => (true, None),
        Err(err) => {
            if let CheckError::Mismatch {
                expected, actual, ..
            } = &err
            {
                data.entry("expected".to_string())
                    .or_insert_with(|| Value::from(expected.as_str()));
                data.entry("actual".to_string())
                    .or_insert_with(|| Value::from(actual.as_str()));
            }
            (false, Some(err.cause()))
        }
    };

    CheckResult {
        name: check.name().to_string(),
        description: check.description().to_string(),
        passed: Some(passed),
        cause,
        log,
        data: if data.is_empty() { None } else { Some(data) },
        dependency: check.prerequisite().map(str::to_string),
    }
}
