//! Sandbox module - Per-check working areas
//!
//! This module provides the isolated filesystem root each check runs in.
//! It handles:
//! - Resolving the submission's file set against its checkout root
//! - Creating a fresh temporary directory per check
//! - Seeding it from the file set or from a prerequisite's final state
//! - Removing it when the check is done
//!
//! The sandbox module does NOT:
//! - Spawn processes (that's the runner's job)
//! - Decide which checks run (that's the scheduler's job)

pub mod file_set;
pub mod working_area;

pub use file_set::FileSet;
pub use working_area::Sandbox;
