//! # rcutorture-core
//!
//! Measurement and detection engine for torture-testing RCU-style
//! synchronization primitives.
//!
//! This crate provides:
//! - [`phase::PhaseController`]: the Init/Run/Stop protocol that lines every
//!   worker up behind a single start edge and a single stop edge.
//! - [`tally`]: per-thread accumulators and the merge into global totals.
//! - [`perf`] and [`stress`]: the five worker roles and their run drivers.
//! - [`flavor`]: the [`flavor::RcuFlavor`] capability trait plus two
//!   reference flavors (QSBR and reader-writer lock).
//! - [`report`]: the two text report formats.
//!
//! No `unsafe` code is permitted at the crate level; CPU pinning and the raw
//! rwlock flavor opt in locally.

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod affinity;
pub mod config;
pub mod crew;
pub mod error;
pub mod flavor;
pub mod perf;
pub mod phase;
pub mod report;
pub mod stress;
pub mod tally;

pub use config::{FlavorKind, Mode, TortureConfig};
pub use error::{ConfigError, TortureError};
pub use flavor::{CurrentSlot, RcuFlavor};
pub use phase::{Phase, PhaseController};
pub use report::{PerfReport, StressReport};
pub use tally::{Role, Totals, WorkerTally};
