//! Submission grader
//!
//! Runs a suite of checks against a student submission. Each check executes
//! in its own working area, may depend on one prerequisite, and produces a
//! structured `CheckResult`.
//!
//! - `registry`: checks and their bodies
//! - `scheduler`: ordering, skip propagation, per-check timeouts
//! - `sandbox`: the submission file set and per-check working areas
//! - `runner`: the process harness (`ProcessHandle`)
//! - `languages`: compile/run/leak-check adapters
//! - `suite`: TOML checks file loader

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod languages;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod scheduler;
pub mod suite;

pub use config::{get_config, init_config, EngineConfig};
pub use context::CheckContext;
pub use crate::core::{Cause, CheckResult, Verdict};
pub use error::{CheckError, SuiteError};
pub use registry::{Check, CheckBody, Registry};
pub use runner::{decimal, Matcher, ProcessHandle};
pub use sandbox::{FileSet, Sandbox};
pub use scheduler::Scheduler;
pub use suite::{load_suite, parse_suite, Suite};
