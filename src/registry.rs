//! Check registry
//!
//! A passive store of checks keyed by name, in registration order. Ordering
//! and execution are the scheduler's job.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::context::CheckContext;
use crate::error::{CheckError, SuiteError};

/// Executable part of a check
#[async_trait]
pub trait CheckBody: Send + Sync {
    async fn run(&self, ctx: CheckContext) -> Result<(), CheckError>;
}

/// Adapter turning an async closure into a `CheckBody`
struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> CheckBody for FnCheck<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CheckError>> + Send + 'static,
{
    async fn run(&self, ctx: CheckContext) -> Result<(), CheckError> {
        (self.0)(ctx).await
    }
}

/// A named unit of verification with at most one prerequisite
#[derive(Clone)]
pub struct Check {
    name: String,
    description: String,
    prerequisite: Option<String>,
    body: Arc<dyn CheckBody>,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        body: Arc<dyn CheckBody>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prerequisite: None,
            body,
        }
    }

    /// Build a check from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CheckError>> + Send + 'static,
    {
        Self::new(name, description, Arc::new(FnCheck(f)))
    }

    /// Require `prerequisite` to pass before this check runs
    pub fn after(mut self, prerequisite: impl Into<String>) -> Self {
        self.prerequisite = Some(prerequisite.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn prerequisite(&self) -> Option<&str> {
        self.prerequisite.as_deref()
    }

    pub fn body(&self) -> Arc<dyn CheckBody> {
        Arc::clone(&self.body)
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("prerequisite", &self.prerequisite)
            .finish_non_exhaustive()
    }
}

/// Checks in registration order
#[derive(Debug, Default)]
pub struct Registry {
    checks: Vec<Check>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Check) -> Result<(), SuiteError> {
        if self.index.contains_key(check.name()) {
            return Err(SuiteError::DuplicateCheck(check.name().to_string()));
        }
        self.index.insert(check.name().to_string(), self.checks.len());
        self.checks.push(check);
        Ok(())
    }

    /// Look up a prerequisite by name
    pub fn resolve(&self, prerequisite: &str) -> Result<&Check, SuiteError> {
        self.get(prerequisite)
            .ok_or_else(|| SuiteError::UnknownPrerequisite {
                prerequisite: prerequisite.to_string(),
                suggestion: self.closest_name(prerequisite),
            })
    }

    pub fn get(&self, name: &str) -> Option<&Check> {
        self.index.get(name).map(|&idx| &self.checks[idx])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn at(&self, idx: usize) -> &Check {
        &self.checks[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Ensure every prerequisite exists and no chain loops back on itself
    pub fn validate(&self) -> Result<(), SuiteError> {
        for check in &self.checks {
            if let Some(prerequisite) = check.prerequisite() {
                if let Err(err) = self.resolve(prerequisite) {
                    warn!("Check {} refers to an unregistered prerequisite", check.name());
                    return Err(err);
                }
            }
        }

        // Each node has at most one parent, so a walk longer than the
        // registry means a cycle.
        for check in &self.checks {
            let mut current = check.prerequisite();
            let mut steps = 0;
            while let Some(name) = current {
                steps += 1;
                if steps > self.checks.len() {
                    return Err(SuiteError::CyclicPrerequisite(check.name().to_string()));
                }
                current = self.get(name).and_then(Check::prerequisite);
            }
        }

        Ok(())
    }

    /// Registered name closest to `name` by edit distance
    pub(crate) fn closest_name(&self, name: &str) -> Option<String> {
        self.checks
            .iter()
            .map(|check| {
                let distance =
                    triple_accel::levenshtein::levenshtein(name.as_bytes(), check.name().as_bytes());
                (distance, check.name())
            })
            .filter(|(distance, _)| *distance <= 3)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, name)| name.to_string())
    }
}
