//! Performance roles: throughput of read-side critical sections and of grace
//! periods.
//!
//! Workers count into stack locals and write their tally exactly once, after
//! the phase has left `Run`. The only shared state a perf worker touches in
//! its loop is the phase flag and the flavor itself.

use std::sync::Arc;
use std::time::Duration;

use crate::affinity::pin_current_thread;
use crate::config::Mode;
use crate::crew::Crew;
use crate::error::TortureError;
use crate::flavor::RcuFlavor;
use crate::phase::PhaseController;
use crate::report::{PerfReport, RunResult};
use crate::tally::{Role, Totals, WorkerTally};

/// Read-side critical sections per batch between phase checks.
pub const READ_BATCH: u64 = 1000;

/// Thread layout of one performance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfPlan {
    pub nreaders: usize,
    pub nupdaters: usize,
    pub cpustride: usize,
    pub duration: Duration,
}

impl PerfPlan {
    /// Layout for a perf-family mode; `None` for stress.
    ///
    /// `n` is the reader count for `perf`/`rperf` and the updater count for
    /// `uperf`; `perf` adds a single updater after the readers.
    #[must_use]
    pub fn for_mode(mode: Mode, n: usize, cpustride: usize, duration: Duration) -> Option<Self> {
        let (nreaders, nupdaters) = match mode {
            Mode::Perf => (n, 1),
            Mode::Rperf => (n, 0),
            Mode::Uperf => (0, n),
            Mode::Stress => return None,
        };
        Some(Self {
            nreaders,
            nupdaters,
            cpustride,
            duration,
        })
    }

    #[must_use]
    pub fn nthreads(&self) -> usize {
        self.nreaders.saturating_add(self.nupdaters)
    }

    /// CPU for the worker at `slot`; readers occupy the low slots and
    /// updaters follow them.
    ///
    /// Saturates at `usize::MAX`, which no CPU mask can hold, so an
    /// oversized stride ends as a recorded `EINVAL` pin failure.
    #[must_use]
    pub fn cpu_for(&self, slot: usize) -> usize {
        slot.saturating_mul(self.cpustride)
    }
}

/// Performance reader body.
pub fn perf_reader<F: RcuFlavor>(
    flavor: &F,
    ctl: &PhaseController,
    index: usize,
    cpu: Option<usize>,
) -> WorkerTally {
    let mut tally = WorkerTally::new(Role::PerfReader, index);
    if let Some(cpu) = cpu {
        tally.pin = pin_current_thread(cpu);
    }
    let me = flavor.register_thread();
    ctl.check_in();
    ctl.wait_for_run();
    flavor.quiescent_state(&me);

    let mut n_reads_local = 0u64;
    while ctl.is_running() {
        for _ in 0..READ_BATCH {
            flavor.read_lock(&me);
            flavor.read_unlock(&me);
        }
        n_reads_local += READ_BATCH;
        flavor.quiescent_state(&me);
    }

    tally.n_reads = n_reads_local;
    flavor.thread_offline(&me);
    flavor.unregister_thread(me);
    tally
}

/// Performance updater body: back-to-back grace periods.
pub fn perf_updater<F: RcuFlavor>(
    flavor: &F,
    ctl: &PhaseController,
    index: usize,
    cpu: Option<usize>,
) -> WorkerTally {
    let mut tally = WorkerTally::new(Role::PerfUpdater, index);
    if let Some(cpu) = cpu {
        tally.pin = pin_current_thread(cpu);
    }
    let me = flavor.register_thread();
    // Updaters never hold read-side references.
    flavor.thread_offline(&me);
    ctl.check_in();
    ctl.wait_for_run();

    let mut n_updates_local = 0u64;
    while ctl.is_running() {
        flavor.synchronize(&me);
        n_updates_local += 1;
    }

    tally.n_updates = n_updates_local;
    flavor.unregister_thread(me);
    tally
}

fn spawn_perf_crew<F: RcuFlavor>(
    crew: &mut Crew,
    flavor: &Arc<F>,
    ctl: &Arc<PhaseController>,
    plan: &PerfPlan,
) -> Result<(), TortureError> {
    for i in 0..plan.nreaders {
        let flavor = Arc::clone(flavor);
        let ctl = Arc::clone(ctl);
        let cpu = plan.cpu_for(i);
        crew.spawn(Role::PerfReader, i, move || {
            perf_reader(&*flavor, &ctl, i, Some(cpu))
        })?;
    }
    for j in 0..plan.nupdaters {
        let slot = plan.nreaders.saturating_add(j);
        let flavor = Arc::clone(flavor);
        let ctl = Arc::clone(ctl);
        let cpu = plan.cpu_for(slot);
        crew.spawn(Role::PerfUpdater, slot, move || {
            perf_updater(&*flavor, &ctl, slot, Some(cpu))
        })?;
    }
    Ok(())
}

/// Run one performance measurement window.
///
/// Every worker is pinned to `slot * cpustride`; pinning failures are
/// recorded in the returned tallies. If a spawn fails, the workers already
/// started are released and joined before the error is returned.
pub fn run_perf<F: RcuFlavor>(
    flavor: Arc<F>,
    ctl: Arc<PhaseController>,
    plan: &PerfPlan,
) -> Result<RunResult<PerfReport>, TortureError> {
    ctl.arm(plan.nthreads());
    let mut crew = Crew::with_capacity(plan.nthreads());
    if let Err(err) = spawn_perf_crew(&mut crew, &flavor, &ctl, plan) {
        crew.abandon(&ctl);
        return Err(err);
    }

    ctl.wait_for_workers();
    ctl.start();
    ctl.run_for(plan.duration);
    let tallies = crew.join_all()?;

    let totals = Totals::merge(&tallies);
    Ok(RunResult {
        report: PerfReport::from_totals(&totals, plan.duration),
        tallies,
    })
}
