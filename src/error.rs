//! Error taxonomy
//!
//! `CheckError` is raised inside a check body and always ends up as that
//! check's cause. `SuiteError` describes a malformed check suite and aborts
//! the whole run before any check executes.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::utils::abbreviate;
use crate::core::Cause;

/// Condition that ends a check early
#[derive(Debug, Error)]
pub enum CheckError {
    /// Assertion failure written by the check author
    #[error("{rationale}")]
    Failure {
        rationale: String,
        help: Option<String>,
    },

    /// Observed output differs from what was expected
    #[error("expected {expected:?}, not {actual:?}")]
    Mismatch {
        expected: String,
        actual: String,
        help: Option<String>,
    },

    #[error("timed out while waiting for {waiting_for}")]
    ProcessTimeout { waiting_for: String },

    #[error("process has already exited")]
    ProcessClosed,

    #[error("check timed out after {seconds} seconds")]
    CheckTimeout { seconds: u64 },

    #[error("failed to prepare working area from {}: {source}", path.display())]
    SandboxSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid output pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("check crashed: {0}")]
    Crashed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CheckError {
    pub fn failure(rationale: impl Into<String>) -> Self {
        CheckError::Failure {
            rationale: rationale.into(),
            help: None,
        }
    }

    pub fn failure_with_help(rationale: impl Into<String>, help: impl Into<String>) -> Self {
        CheckError::Failure {
            rationale: rationale.into(),
            help: Some(help.into()),
        }
    }

    /// Mismatch with the actual text shortened for display
    pub fn mismatch(expected: impl Into<String>, actual: &str) -> Self {
        CheckError::Mismatch {
            expected: expected.into(),
            actual: abbreviate(actual),
            help: None,
        }
    }

    /// Convert into the cause recorded on a failed result
    pub fn cause(&self) -> Cause {
        match self {
            CheckError::Failure { rationale, help } => Cause {
                rationale: rationale.clone(),
                help: help.clone(),
            },
            CheckError::Mismatch { help, .. } => Cause {
                rationale: self.to_string(),
                help: help.clone(),
            },
            CheckError::ProcessTimeout { .. } => Cause::new(self.to_string())
                .with_help("check that the program is not waiting for input it never receives"),
            CheckError::SandboxSetup { .. } => Cause::new(self.to_string())
                .with_help("this is a problem with the checking environment, not with the submission"),
            CheckError::Other(err) => Cause::new(format!("{:#}", err)),
            _ => Cause::new(self.to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CheckError::ProcessTimeout { .. } | CheckError::CheckTimeout { .. }
        )
    }
}

/// Configuration error in the check suite itself
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("check \"{0}\" is registered more than once")]
    DuplicateCheck(String),

    #[error(
        "unknown prerequisite \"{prerequisite}\"{}",
        suggestion_hint(.suggestion)
    )]
    UnknownPrerequisite {
        prerequisite: String,
        suggestion: Option<String>,
    },

    #[error("check \"{0}\" is part of a prerequisite cycle")]
    CyclicPrerequisite(String),

    #[error("unknown check \"{name}\"{}", suggestion_hint(.suggestion))]
    UnknownTarget {
        name: String,
        suggestion: Option<String>,
    },
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!("; did you mean \"{}\"?", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_rationale_escapes_output() {
        let err = CheckError::mismatch("Hello", "Goodbye\n");
        assert_eq!(err.cause().rationale, r#"expected "Hello", not "Goodbye\n""#);
    }

    #[test]
    fn test_failure_cause_keeps_help() {
        let cause = CheckError::failure_with_help("code failed to compile", "read the log").cause();
        assert_eq!(cause.rationale, "code failed to compile");
        assert_eq!(cause.help.as_deref(), Some("read the log"));
    }

    #[test]
    fn test_other_error_uses_full_chain() {
        let err: CheckError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.cause().rationale, "outer: inner");
    }

    #[test]
    fn test_unknown_target_suggestion() {
        let err = SuiteError::UnknownTarget {
            name: "compile".to_string(),
            suggestion: Some("compiles".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "unknown check \"compile\"; did you mean \"compiles\"?"
        );
    }
}
