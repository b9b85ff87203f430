//! Sodium common types and errors.
//!
//! This crate provides foundational types shared by the sodium crates:
//! - The unified error taxonomy with stable codes
//! - Per-command failures and the attempt ledger of a property chain
//! - Structured device records (window size, app info, running app)
//! - Output formats

pub mod error;
pub mod output;
pub mod records;

pub use error::{Attempt, AttemptOutcome, CommandFailure, Error, Result, StructuredError};
pub use output::OutputFormat;
pub use records::{AppInfo, RunningApp, WindowSize};
