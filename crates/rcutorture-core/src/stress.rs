//! Stress roles: staleness histogram and memory-ordering violation detection.
//!
//! One updater cycles a ring of [`PIPE_LEN`] slots. Each cycle it
//! re-initializes the next slot in a fixed field order, publishes it, ages
//! every other slot by one, and waits for a grace period. Readers sample the
//! current slot inside a read-side critical section and record how stale it
//! was (its pipe-count) and whether it looked uninitialized (`mbtest` false).
//!
//! Publication order, which is the property under test:
//! `mbtest = false` → full fence → `pipe_count = 0` → `mbtest = true` →
//! `publish`.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering, fence};
use std::sync::Arc;
use std::time::Duration;

use crate::crew::Crew;
use crate::error::TortureError;
use crate::flavor::{CurrentSlot, RcuFlavor};
use crate::phase::PhaseController;
use crate::report::{RunResult, StressReport};
use crate::tally::{Role, Totals, WorkerTally};

/// Number of slots in the ring; the histogram has one more bucket.
pub const PIPE_LEN: usize = 10;

/// Decoy updaters that only request grace periods.
pub const FAKE_UPDATERS: usize = 5;

/// Reader iterations between offline/online cycles.
pub const OFFLINE_CADENCE: u64 = 0x1000;

/// Relaxed scratch read-modify-writes inside each read-side section.
const SCRATCH_ROUNDS: usize = 100;

/// Pause between fake-updater grace periods.
const FAKE_UPDATE_PAUSE: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StressSlot {
    pipe_count: AtomicI64,
    mbtest: AtomicBool,
}

impl StressSlot {
    #[must_use]
    pub fn pipe_count(&self) -> i64 {
        self.pipe_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn mbtest(&self) -> bool {
        self.mbtest.load(Ordering::Relaxed)
    }
}

/// The versioned slots plus the handle naming the current one.
#[derive(Debug)]
pub struct StressRing {
    slots: [StressSlot; PIPE_LEN],
    current: CurrentSlot,
    scratch: AtomicU64,
}

impl Default for StressRing {
    fn default() -> Self {
        Self::new()
    }
}

impl StressRing {
    /// Slot 0 starts current and fully initialized.
    #[must_use]
    pub fn new() -> Self {
        let ring = Self {
            slots: Default::default(),
            current: CurrentSlot::new(0),
            scratch: AtomicU64::new(0),
        };
        ring.slots[0].pipe_count.store(0, Ordering::Relaxed);
        ring.slots[0].mbtest.store(true, Ordering::Relaxed);
        ring
    }

    #[must_use]
    pub fn slot(&self, idx: usize) -> &StressSlot {
        &self.slots[idx]
    }

    #[must_use]
    pub fn current(&self) -> &CurrentSlot {
        &self.current
    }

    /// Make `idx` look uninitialized to readers.
    #[cfg(test)]
    pub(crate) fn poison(&self, idx: usize) {
        self.slots[idx].mbtest.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// One sampled read-side critical section, recorded into `tally`.
#[inline]
pub fn stress_read_once<F: RcuFlavor>(
    flavor: &F,
    me: &F::Reader,
    ring: &StressRing,
    tally: &mut WorkerTally,
) {
    flavor.read_lock(me);
    let p = ring.slot(flavor.dereference(ring.current()));
    if !p.mbtest.load(Ordering::Relaxed) {
        tally.n_mberror += 1;
    }
    if flavor.nestable() {
        flavor.read_lock(me);
    }
    for _ in 0..SCRATCH_ROUNDS {
        let v = ring.scratch.load(Ordering::Relaxed);
        ring.scratch.store(v.wrapping_add(1), Ordering::Relaxed);
    }
    if flavor.nestable() {
        flavor.read_unlock(me);
    }
    let pc = p.pipe_count.load(Ordering::Relaxed);
    flavor.read_unlock(me);
    tally.record_stress_read(pc);
}

/// Stress reader body.
pub fn stress_reader<F: RcuFlavor>(
    flavor: &F,
    ctl: &PhaseController,
    ring: &StressRing,
    index: usize,
) -> WorkerTally {
    let mut tally = WorkerTally::new(Role::StressReader, index);
    let me = flavor.register_thread();
    ctl.check_in();
    ctl.wait_for_run();
    flavor.quiescent_state(&me);

    let offline_capable = flavor.supports_offline();
    let mut itercnt = 0u64;
    while ctl.is_running() {
        stress_read_once(flavor, &me, ring, &mut tally);
        flavor.quiescent_state(&me);
        itercnt += 1;
        if offline_capable && itercnt % OFFLINE_CADENCE == 0 {
            flavor.thread_offline(&me);
            flavor.synchronize(&me);
            flavor.thread_online(&me);
        }
    }

    flavor.thread_offline(&me);
    flavor.unregister_thread(me);
    tally
}

// ---------------------------------------------------------------------------
// Updaters
// ---------------------------------------------------------------------------

/// One update cycle. `idx` is the updater's private ring cursor.
pub fn stress_update_once<F: RcuFlavor>(
    flavor: &F,
    me: &F::Reader,
    ring: &StressRing,
    idx: &mut usize,
) {
    let next = (*idx + 1) % PIPE_LEN;
    let p = ring.slot(next);
    p.mbtest.store(false, Ordering::Relaxed);
    fence(Ordering::SeqCst);
    p.pipe_count.store(0, Ordering::Relaxed);
    p.mbtest.store(true, Ordering::Relaxed);
    flavor.publish(ring.current(), next);
    *idx = next;

    for (i, slot) in ring.slots.iter().enumerate() {
        if i != next {
            slot.pipe_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    flavor.synchronize(me);
}

/// Stress updater body.
pub fn stress_updater<F: RcuFlavor>(
    flavor: &F,
    ctl: &PhaseController,
    ring: &StressRing,
    index: usize,
) -> WorkerTally {
    let mut tally = WorkerTally::new(Role::StressUpdater, index);
    let me = flavor.register_thread();
    flavor.thread_offline(&me);
    ctl.check_in();
    ctl.wait_for_run();

    let mut idx = flavor.dereference(ring.current());
    let mut n_updates_local = 0u64;
    while ctl.is_running() {
        stress_update_once(flavor, &me, ring, &mut idx);
        n_updates_local += 1;
    }

    tally.n_updates = n_updates_local;
    flavor.unregister_thread(me);
    tally
}

/// Fake updater body: grace periods with no state change.
pub fn fake_updater<F: RcuFlavor>(flavor: &F, ctl: &PhaseController, index: usize) -> WorkerTally {
    let tally = WorkerTally::new(Role::FakeUpdater, index);
    let me = flavor.register_thread();
    flavor.thread_offline(&me);
    ctl.check_in();
    ctl.wait_for_run();

    while ctl.is_running() {
        flavor.synchronize(&me);
        std::thread::sleep(FAKE_UPDATE_PAUSE);
    }

    flavor.unregister_thread(me);
    tally
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

fn spawn_stress_crew<F: RcuFlavor>(
    crew: &mut Crew,
    flavor: &Arc<F>,
    ctl: &Arc<PhaseController>,
    ring: &Arc<StressRing>,
    nreaders: usize,
) -> Result<(), TortureError> {
    for i in 0..nreaders {
        let (flavor, ctl, ring) = (Arc::clone(flavor), Arc::clone(ctl), Arc::clone(ring));
        crew.spawn(Role::StressReader, i, move || {
            stress_reader(&*flavor, &ctl, &ring, i)
        })?;
    }
    {
        let (flavor, ctl, ring) = (Arc::clone(flavor), Arc::clone(ctl), Arc::clone(ring));
        crew.spawn(Role::StressUpdater, nreaders, move || {
            stress_updater(&*flavor, &ctl, &ring, nreaders)
        })?;
    }
    for k in 0..FAKE_UPDATERS {
        let index = nreaders.saturating_add(1 + k);
        let (flavor, ctl) = (Arc::clone(flavor), Arc::clone(ctl));
        crew.spawn(Role::FakeUpdater, index, move || {
            fake_updater(&*flavor, &ctl, index)
        })?;
    }
    Ok(())
}

/// Run one stress window: `nreaders` readers, one real updater and
/// [`FAKE_UPDATERS`] decoys. Stress workers are never pinned. If a spawn
/// fails, the workers already started are released and joined before the
/// error is returned.
pub fn run_stress<F: RcuFlavor>(
    flavor: Arc<F>,
    ctl: Arc<PhaseController>,
    nreaders: usize,
    duration: Duration,
) -> Result<RunResult<StressReport>, TortureError> {
    let ring = Arc::new(StressRing::new());
    let nthreads = nreaders.saturating_add(1 + FAKE_UPDATERS);
    ctl.arm(nthreads);
    let mut crew = Crew::with_capacity(nthreads);
    if let Err(err) = spawn_stress_crew(&mut crew, &flavor, &ctl, &ring, nreaders) {
        crew.abandon(&ctl);
        return Err(err);
    }

    ctl.wait_for_workers();
    ctl.start();
    ctl.run_for(duration);
    let tallies = crew.join_all()?;

    let totals = Totals::merge(&tallies);
    Ok(RunResult {
        report: StressReport::from_totals(&totals),
        tallies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::{Qsbr, RwLockRcu};

    #[test]
    fn fresh_ring_publishes_initialized_slot_zero() {
        let ring = StressRing::new();
        let rcu = Qsbr::new();
        assert_eq!(rcu.dereference(ring.current()), 0);
        assert!(ring.slot(0).mbtest());
        assert_eq!(ring.slot(0).pipe_count(), 0);
    }

    #[test]
    fn update_cycle_publishes_next_slot_and_ages_the_rest() {
        let ring = StressRing::new();
        let rcu = Qsbr::new();
        let me = rcu.register_thread();
        let mut idx = 0;

        stress_update_once(&rcu, &me, &ring, &mut idx);
        assert_eq!(idx, 1);
        assert_eq!(rcu.dereference(ring.current()), 1);
        assert!(ring.slot(1).mbtest());
        assert_eq!(ring.slot(1).pipe_count(), 0);
        for i in (0..PIPE_LEN).filter(|&i| i != 1) {
            assert_eq!(ring.slot(i).pipe_count(), 1, "slot {i}");
        }

        stress_update_once(&rcu, &me, &ring, &mut idx);
        assert_eq!(ring.slot(2).pipe_count(), 0);
        assert_eq!(ring.slot(1).pipe_count(), 1);
        assert_eq!(ring.slot(0).pipe_count(), 2);
        rcu.unregister_thread(me);
    }

    #[test]
    fn ring_cursor_wraps() {
        let ring = StressRing::new();
        let rcu = RwLockRcu::new();
        let me = rcu.register_thread();
        let mut idx = 0;
        for _ in 0..PIPE_LEN {
            stress_update_once(&rcu, &me, &ring, &mut idx);
        }
        assert_eq!(idx, 0);
        assert_eq!(rcu.dereference(ring.current()), 0);
        assert_eq!(ring.slot(0).pipe_count(), 0);
        assert_eq!(ring.slot(1).pipe_count(), (PIPE_LEN - 1) as i64);
    }

    #[test]
    fn reader_counts_fresh_and_stale_observations() {
        let ring = StressRing::new();
        let rcu = RwLockRcu::new();
        let reader = rcu.register_thread();
        let writer = rcu.register_thread();
        let mut tally = WorkerTally::new(Role::StressReader, 0);

        stress_read_once(&rcu, &reader, &ring, &mut tally);
        let mut idx = 0;
        stress_update_once(&rcu, &writer, &ring, &mut idx);
        stress_read_once(&rcu, &reader, &ring, &mut tally);

        assert_eq!(tally.n_reads, 2);
        assert_eq!(tally.stress_count[0], 2);
        assert_eq!(tally.n_mberror, 0);
    }

    #[test]
    fn reader_flags_uninitialized_slot() {
        let ring = StressRing::new();
        ring.poison(0);
        let rcu = Qsbr::new();
        let me = rcu.register_thread();
        let mut tally = WorkerTally::new(Role::StressReader, 0);

        stress_read_once(&rcu, &me, &ring, &mut tally);
        stress_read_once(&rcu, &me, &ring, &mut tally);

        assert_eq!(tally.n_mberror, 2);
        assert_eq!(tally.n_reads, 2);
        rcu.unregister_thread(me);
    }

    #[test]
    fn stress_run_histogram_matches_reads() {
        let run = run_stress(
            Arc::new(Qsbr::new()),
            Arc::new(PhaseController::new()),
            2,
            Duration::from_millis(200),
        )
        .unwrap();
        let r = &run.report;
        assert_eq!(r.rcu_stress_count.iter().sum::<u64>(), r.n_reads);
        assert_eq!(r.n_mberror, 0);
        assert!(r.n_reads > 0);
        assert!(r.n_updates > 0);
        assert_eq!(run.tallies.len(), 2 + 1 + FAKE_UPDATERS);
    }
}
