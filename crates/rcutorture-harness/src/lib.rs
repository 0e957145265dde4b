//! Command-line driver for rcutorture.
//!
//! This crate provides:
//! - [`runner::TortureRunner`]: resolves a flavor, runs one measurement
//!   window, and logs its lifecycle.
//! - [`structured_log`]: the JSONL log schema, emitter, and validators.
//! - [`artifacts`]: the on-disk run bundle (report, trace, SHA-256 index).

#![forbid(unsafe_code)]

pub mod artifacts;
pub mod error;
pub mod runner;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{RunOutcome, RunReport, TortureRunner};

/// Printed on stderr when the command line cannot be understood.
pub const USAGE: &str = "Usage: rcutorture [nreaders [ perf | rperf | uperf | stress [cpustride] ] ]";

/// Tag prefixed to every trace ID.
pub const RUN_TAG: &str = "rcutorture";
