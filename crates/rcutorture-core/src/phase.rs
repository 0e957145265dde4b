//! Phase controller: the Init → Run → Stop protocol shared by all workers.
//!
//! The controller is the only writer of the phase flag. Workers check in on
//! the running-thread gate once their one-time setup is done, wait while the
//! phase is `Init`, and loop while it is `Run`. Both transitions are bracketed
//! by full fences so that no worker observes `Run` ahead of controller-side
//! setup, and no operation is counted past the `Stop` edge.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering, fence};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Global phase of a torture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Run,
    Stop,
}

const PHASE_INIT: u8 = 0;
const PHASE_RUN: u8 = 1;
const PHASE_STOP: u8 = 2;

fn u8_to_phase(v: u8) -> Phase {
    match v {
        PHASE_RUN => Phase::Run,
        PHASE_STOP => Phase::Stop,
        _ => Phase::Init,
    }
}

/// Interval between gate polls on the controller side, and between phase
/// polls on the worker side once spinning has been abandoned.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Spin rounds a worker burns on the phase flag before it starts sleeping.
const SPIN_ROUNDS: u32 = 64;

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Tri-state phase flag plus running-thread gate.
///
/// The flag sits on its own cache line so that hot-loop polling by readers
/// does not false-share with the gate counter.
#[derive(Debug)]
pub struct PhaseController {
    phase: CachePadded<AtomicU8>,
    running: CachePadded<AtomicUsize>,
    expected: AtomicUsize,
}

#[derive(Debug)]
#[repr(align(64))]
struct CachePadded<T>(T);

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: CachePadded(AtomicU8::new(PHASE_INIT)),
            running: CachePadded(AtomicUsize::new(0)),
            expected: AtomicUsize::new(0),
        }
    }

    /// Reset to `Init` and expect `workers` check-ins before `start`.
    ///
    /// Must be called before any worker of the run is spawned.
    pub fn arm(&self, workers: usize) {
        self.phase.0.store(PHASE_INIT, Ordering::SeqCst);
        self.running.0.store(0, Ordering::SeqCst);
        self.expected.store(workers, Ordering::SeqCst);
    }

    /// Number of workers expected at the gate.
    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Acquire)
    }

    /// Number of workers that have checked in so far.
    #[must_use]
    pub fn checked_in(&self) -> usize {
        self.running.0.load(Ordering::Acquire)
    }

    /// Current phase (acquire load).
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        u8_to_phase(self.phase.0.load(Ordering::Acquire))
    }

    /// Hot-loop check used by every worker.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase.0.load(Ordering::Acquire) == PHASE_RUN
    }

    // --- worker side ---

    /// Signal the gate. Called exactly once per worker after pinning and
    /// flavor registration.
    pub fn check_in(&self) {
        self.running.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Wait while the phase is `Init` and return the phase that ended the
    /// wait.
    ///
    /// Spins briefly, then falls back to 1 ms sleeps so that idle workers do
    /// not steal cycles from threads still doing setup.
    pub fn wait_for_run(&self) -> Phase {
        let mut spins = 0u32;
        loop {
            let v = self.phase.0.load(Ordering::Acquire);
            if v != PHASE_INIT {
                fence(Ordering::SeqCst);
                return u8_to_phase(v);
            }
            if spins < SPIN_ROUNDS {
                spins += 1;
                core::hint::spin_loop();
            } else {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }

    // --- controller side ---

    /// Block until every expected worker has checked in.
    ///
    /// Hangs forever if a worker never arrives.
    pub fn wait_for_workers(&self) {
        fence(Ordering::SeqCst);
        let expected = self.expected();
        while self.checked_in() < expected {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Transition `Init → Run`.
    pub fn start(&self) {
        fence(Ordering::SeqCst);
        let prev = self.phase.0.swap(PHASE_RUN, Ordering::SeqCst);
        debug_assert_eq!(prev, PHASE_INIT, "start() from a non-Init phase");
        fence(Ordering::SeqCst);
    }

    /// Transition `Run → Stop`.
    pub fn stop(&self) {
        fence(Ordering::SeqCst);
        let prev = self.phase.0.swap(PHASE_STOP, Ordering::SeqCst);
        debug_assert_eq!(prev, PHASE_RUN, "stop() from a non-Run phase");
        fence(Ordering::SeqCst);
    }

    /// Move to `Stop` from any phase, releasing workers parked at the gate
    /// without ever exposing `Run` to them.
    pub fn abort(&self) {
        fence(Ordering::SeqCst);
        self.phase.0.store(PHASE_STOP, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Sleep for the measurement window, then stop.
    pub fn run_for(&self, duration: Duration) {
        std::thread::sleep(duration);
        self.stop();
    }
}
