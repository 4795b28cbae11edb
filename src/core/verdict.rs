use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Why a check failed or was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Cause {
    pub fn new(rationale: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Result of one check, as handed to the reporting layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub description: String,
    /// `Some(true)` passed, `Some(false)` failed, `None` skipped
    pub passed: Option<bool>,
    pub cause: Option<Cause>,
    pub log: Vec<String>,
    pub data: Option<BTreeMap<String, Value>>,
    /// Name of the prerequisite check, if any
    pub dependency: Option<String>,
}

impl CheckResult {
    pub fn verdict(&self) -> Verdict {
        match self.passed {
            Some(true) => Verdict::Passed,
            Some(false) => Verdict::Failed,
            None => Verdict::Skipped,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.passed == Some(true)
    }
}
