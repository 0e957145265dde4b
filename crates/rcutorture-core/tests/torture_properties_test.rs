//! Integration test: whole-run properties of the perf and stress drivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rcutorture_core::flavor::{CurrentSlot, Qsbr, RcuFlavor, RwLockRcu};
use rcutorture_core::perf::{PerfPlan, READ_BATCH, run_perf};
use rcutorture_core::stress::{FAKE_UPDATERS, OFFLINE_CADENCE, PIPE_LEN, run_stress};
use rcutorture_core::{Mode, Phase, PhaseController, Role, Totals};

const WINDOW: Duration = Duration::from_millis(250);

/// Wraps a flavor and records every read-side entry or grace-period request
/// issued before the controller reached `Run`, plus every offline transition.
struct PhaseChecked<F> {
    inner: F,
    ctl: Arc<PhaseController>,
    early: AtomicU64,
    reads: AtomicU64,
    syncs: AtomicU64,
    offlines: AtomicU64,
}

impl<F: RcuFlavor> PhaseChecked<F> {
    fn new(inner: F, ctl: Arc<PhaseController>) -> Self {
        Self {
            inner,
            ctl,
            early: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            offlines: AtomicU64::new(0),
        }
    }

    fn check(&self) {
        if self.ctl.phase() == Phase::Init {
            self.early.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<F: RcuFlavor> RcuFlavor for PhaseChecked<F> {
    type Reader = F::Reader;

    fn name(&self) -> &'static str {
        "phase-checked"
    }
    fn register_thread(&self) -> Self::Reader {
        self.inner.register_thread()
    }
    fn unregister_thread(&self, reader: Self::Reader) {
        self.inner.unregister_thread(reader);
    }
    fn read_lock(&self, reader: &Self::Reader) {
        self.check();
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read_lock(reader);
    }
    fn read_unlock(&self, reader: &Self::Reader) {
        self.inner.read_unlock(reader);
    }
    fn synchronize(&self, reader: &Self::Reader) {
        self.check();
        self.syncs.fetch_add(1, Ordering::Relaxed);
        self.inner.synchronize(reader);
    }
    fn publish(&self, current: &CurrentSlot, slot: usize) {
        self.check();
        self.inner.publish(current, slot);
    }
    fn dereference(&self, current: &CurrentSlot) -> usize {
        self.inner.dereference(current)
    }
    fn quiescent_state(&self, reader: &Self::Reader) {
        self.inner.quiescent_state(reader);
    }
    fn supports_offline(&self) -> bool {
        self.inner.supports_offline()
    }
    fn thread_offline(&self, reader: &Self::Reader) {
        self.offlines.fetch_add(1, Ordering::Relaxed);
        self.inner.thread_offline(reader);
    }
    fn thread_online(&self, reader: &Self::Reader) {
        self.inner.thread_online(reader);
    }
    fn nestable(&self) -> bool {
        self.inner.nestable()
    }
}

#[test]
fn perf_totals_conserve_per_thread_counts() {
    let plan = PerfPlan::for_mode(Mode::Perf, 3, 1, WINDOW).unwrap();
    let run = run_perf(Arc::new(Qsbr::new()), Arc::new(PhaseController::new()), &plan).unwrap();

    let reader_sum: u64 = run
        .tallies
        .iter()
        .filter(|t| t.role == Role::PerfReader)
        .map(|t| t.n_reads)
        .sum();
    let updater_sum: u64 = run
        .tallies
        .iter()
        .filter(|t| t.role == Role::PerfUpdater)
        .map(|t| t.n_updates)
        .sum();
    assert_eq!(run.report.n_reads, reader_sum);
    assert_eq!(run.report.n_updates, updater_sum);
    assert_eq!(Totals::merge(&run.tallies).n_reads, reader_sum);
    for t in run.tallies.iter().filter(|t| t.role == Role::PerfReader) {
        assert_eq!(t.n_reads % READ_BATCH, 0);
    }
}

#[test]
fn no_operation_precedes_run_in_perf_mode() {
    let ctl = Arc::new(PhaseController::new());
    let flavor = Arc::new(PhaseChecked::new(Qsbr::new(), Arc::clone(&ctl)));
    let plan = PerfPlan::for_mode(Mode::Perf, 4, 1, WINDOW).unwrap();
    let run = run_perf(Arc::clone(&flavor), ctl, &plan).unwrap();

    assert_eq!(flavor.early.load(Ordering::Relaxed), 0);
    assert!(flavor.reads.load(Ordering::Relaxed) >= run.report.n_reads);
    assert!(flavor.syncs.load(Ordering::Relaxed) >= run.report.n_updates);
}

#[test]
fn no_operation_precedes_run_in_stress_mode() {
    let ctl = Arc::new(PhaseController::new());
    let flavor = Arc::new(PhaseChecked::new(RwLockRcu::new(), Arc::clone(&ctl)));
    let run = run_stress(Arc::clone(&flavor), ctl, 2, WINDOW).unwrap();

    assert_eq!(flavor.early.load(Ordering::Relaxed), 0);
    assert_eq!(run.report.n_mberror, 0);
}

#[test]
fn stress_readers_cycle_offline_at_cadence() {
    let ctl = Arc::new(PhaseController::new());
    let flavor = Arc::new(PhaseChecked::new(Qsbr::new(), Arc::clone(&ctl)));
    let run = run_stress(Arc::clone(&flavor), ctl, 2, WINDOW).unwrap();

    let readers: Vec<_> = run
        .tallies
        .iter()
        .filter(|t| t.role == Role::StressReader)
        .collect();
    let cycles: u64 = readers.iter().map(|t| t.n_reads / OFFLINE_CADENCE).sum();
    assert!(cycles > 0, "window too short to reach one cycle");

    // Each reader: one per cycle plus one at exit. Each updater, real or
    // fake: one right after registering.
    let expected = cycles + readers.len() as u64 + 1 + FAKE_UPDATERS as u64;
    assert_eq!(flavor.offlines.load(Ordering::Relaxed), expected);
}

#[test]
fn offline_cycle_is_skipped_without_support() {
    let ctl = Arc::new(PhaseController::new());
    let flavor = Arc::new(PhaseChecked::new(RwLockRcu::new(), Arc::clone(&ctl)));
    let run = run_stress(Arc::clone(&flavor), ctl, 2, WINDOW).unwrap();
    assert!(run.report.n_reads >= OFFLINE_CADENCE);
    // Only the unconditional transitions: reader exits and updater setup.
    assert_eq!(
        flavor.offlines.load(Ordering::Relaxed),
        2 + 1 + FAKE_UPDATERS as u64
    );
}

#[test]
fn stress_histogram_accounts_for_every_read() {
    for nreaders in [1, 4] {
        let run = run_stress(
            Arc::new(Qsbr::new()),
            Arc::new(PhaseController::new()),
            nreaders,
            WINDOW,
        )
        .unwrap();
        let r = &run.report;
        assert_eq!(r.rcu_stress_count.len(), PIPE_LEN + 1);
        assert_eq!(r.rcu_stress_count.iter().sum::<u64>(), r.n_reads);
        let fakes = run
            .tallies
            .iter()
            .filter(|t| t.role == Role::FakeUpdater)
            .count();
        assert_eq!(fakes, FAKE_UPDATERS);
    }
}

#[test]
fn correct_flavors_report_no_ordering_violations() {
    let qsbr = run_stress(
        Arc::new(Qsbr::new()),
        Arc::new(PhaseController::new()),
        3,
        WINDOW,
    )
    .unwrap();
    assert_eq!(qsbr.report.n_mberror, 0);

    let rwlock = run_stress(
        Arc::new(RwLockRcu::new()),
        Arc::new(PhaseController::new()),
        3,
        WINDOW,
    )
    .unwrap();
    assert_eq!(rwlock.report.n_mberror, 0);
    assert!(rwlock.report.n_updates > 0, "rwlock updater must not starve");
}

#[test]
fn full_window_fills_fresh_and_one_behind_buckets() {
    let run = run_stress(
        Arc::new(Qsbr::new()),
        Arc::new(PhaseController::new()),
        2,
        Duration::from_secs(1),
    )
    .unwrap();
    let counts = run.report.rcu_stress_count;
    assert!(counts[0] > 0, "histogram: {counts:?}");

    // Observing a slot one update behind needs a reader and the updater to
    // overlap in real time.
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    if cpus >= 2 {
        assert!(counts[1] > 0, "histogram: {counts:?}");
    }
}

#[test]
fn controller_is_reusable_across_runs() {
    let ctl = Arc::new(PhaseController::new());
    let plan = PerfPlan::for_mode(Mode::Rperf, 1, 1, Duration::from_millis(50)).unwrap();
    run_perf(Arc::new(Qsbr::new()), Arc::clone(&ctl), &plan).unwrap();
    assert_eq!(ctl.phase(), Phase::Stop);
    run_stress(Arc::new(Qsbr::new()), Arc::clone(&ctl), 1, Duration::from_millis(50)).unwrap();
    assert_eq!(ctl.phase(), Phase::Stop);
}
