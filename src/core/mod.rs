//! Core types shared across the engine
//!
//! - `verdict`: per-check results and their causes
//! - `utils`: text helpers (ANSI stripping, log truncation, hashing)

pub mod utils;
pub mod verdict;

pub use verdict::{Cause, CheckResult, Verdict};
