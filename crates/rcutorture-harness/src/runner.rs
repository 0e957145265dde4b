//! Run orchestration: flavor selection, one measurement window, lifecycle
//! logging.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use rcutorture_core::affinity::PinOutcome;
use rcutorture_core::flavor::{Qsbr, RwLockRcu};
use rcutorture_core::perf::{PerfPlan, run_perf};
use rcutorture_core::stress::run_stress;
use rcutorture_core::{
    FlavorKind, PerfReport, PhaseController, RcuFlavor, StressReport, TortureConfig, TortureError,
    WorkerTally,
};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogLevel, Outcome};

/// Report of either run family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunReport {
    Perf(PerfReport),
    Stress(StressReport),
}

impl RunReport {
    /// `Fail` when any stress reader saw an uninitialized slot.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Stress(r) if r.n_mberror > 0 => Outcome::Fail,
            _ => Outcome::Pass,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Perf(r) => fmt::Display::fmt(r, f),
            Self::Stress(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// A worker whose pinning request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinFailure {
    pub role: &'static str,
    pub worker: usize,
    pub cpu: usize,
    pub errno: i32,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub tallies: Vec<WorkerTally>,
    pub pin_failures: Vec<PinFailure>,
    pub elapsed: Duration,
}

impl RunOutcome {
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.report.outcome()
    }
}

fn pin_failures(tallies: &[WorkerTally]) -> Vec<PinFailure> {
    tallies
        .iter()
        .filter_map(|t| match t.pin {
            PinOutcome::Failed { cpu, errno } => Some(PinFailure {
                role: t.role.name(),
                worker: t.index,
                cpu,
                errno,
            }),
            _ => None,
        })
        .collect()
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Drives one torture run for a resolved configuration.
#[derive(Debug)]
pub struct TortureRunner {
    config: TortureConfig,
    ctl: Arc<PhaseController>,
    artifact_refs: Vec<String>,
}

impl TortureRunner {
    #[must_use]
    pub fn new(config: TortureConfig) -> Self {
        Self {
            config,
            ctl: Arc::new(PhaseController::new()),
            artifact_refs: Vec::new(),
        }
    }

    /// Artifacts the completion event should point at.
    #[must_use]
    pub fn with_artifact_refs(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = refs;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TortureConfig {
        &self.config
    }

    /// Run one window, logging `run_start`, any `pin_failed` warnings, and
    /// `run_complete` or `run_error`.
    pub fn run(&self, log: &mut LogEmitter) -> Result<RunOutcome, HarnessError> {
        let cfg = &self.config;
        let start = log
            .entry(LogLevel::Info, "run_start")
            .with_run(cfg.mode.as_str(), cfg.flavor.as_str())
            .with_details(serde_json::json!({
                "nthreads": cfg.nthreads,
                "cpustride": cfg.cpustride,
                "duration_secs": cfg.duration.as_secs(),
            }));
        log.emit_entry(start)?;

        let began = Instant::now();
        let result = match cfg.flavor {
            FlavorKind::Qsbr => self.run_with(Qsbr::new()),
            FlavorKind::RwLock => self.run_with(RwLockRcu::new()),
        };
        let elapsed = began.elapsed();

        let (report, tallies) = match result {
            Ok(done) => done,
            Err(err) => {
                let entry = log
                    .entry(LogLevel::Error, "run_error")
                    .with_run(cfg.mode.as_str(), cfg.flavor.as_str())
                    .with_outcome(Outcome::Error)
                    .with_duration_ms(duration_ms(elapsed))
                    .with_details(serde_json::json!({ "error": err.to_string() }));
                log.emit_entry(entry)?;
                log.flush()?;
                return Err(err.into());
            }
        };

        let pin_failures = pin_failures(&tallies);
        for failure in &pin_failures {
            let entry = log
                .entry(LogLevel::Warn, "pin_failed")
                .with_run(cfg.mode.as_str(), cfg.flavor.as_str())
                .with_worker(failure.role, failure.worker)
                .with_details(serde_json::json!({
                    "cpu": failure.cpu,
                    "errno": failure.errno,
                }));
            log.emit_entry(entry)?;
        }

        let details = serde_json::to_value(&report).map_err(|source| HarnessError::Json {
            what: "report",
            source,
        })?;
        let mut done = log
            .entry(LogLevel::Info, "run_complete")
            .with_run(cfg.mode.as_str(), cfg.flavor.as_str())
            .with_outcome(report.outcome())
            .with_exit_code(0)
            .with_duration_ms(duration_ms(elapsed))
            .with_details(details);
        if !self.artifact_refs.is_empty() {
            done = done.with_artifacts(self.artifact_refs.clone());
        }
        log.emit_entry(done)?;
        log.flush()?;

        Ok(RunOutcome {
            report,
            tallies,
            pin_failures,
            elapsed,
        })
    }

    fn run_with<F: RcuFlavor>(
        &self,
        flavor: F,
    ) -> Result<(RunReport, Vec<WorkerTally>), TortureError> {
        let cfg = &self.config;
        let flavor = Arc::new(flavor);
        match PerfPlan::for_mode(cfg.mode, cfg.nthreads, cfg.cpustride, cfg.duration) {
            Some(plan) => {
                let run = run_perf(flavor, Arc::clone(&self.ctl), &plan)?;
                Ok((RunReport::Perf(run.report), run.tallies))
            }
            None => {
                let run = run_stress(flavor, Arc::clone(&self.ctl), cfg.nthreads, cfg.duration)?;
                Ok((RunReport::Stress(run.report), run.tallies))
            }
        }
    }
}
