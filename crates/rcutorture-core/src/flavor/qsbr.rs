//! Quiescent-State-Based Reclamation (QSBR) flavor.
//!
//! Readers are wait-free: `read_lock`/`read_unlock` compile to nothing and a
//! reader is implicitly inside a critical section between two quiescent
//! states. Writers advance a global epoch and wait until every registered,
//! online reader has announced a quiescent state at or past it.
//!
//! # Design
//!
//! - Per-thread epoch slot, cache-line aligned to avoid false sharing.
//! - Global epoch counter incremented by every `synchronize`.
//! - Offline readers publish `EPOCH_OFFLINE` and are skipped by writers.
//! - The registry is a growable `Vec` behind an `RwLock`; it is only touched
//!   by registration and by writers, never by the read-side fast path.

use core::sync::atomic::{AtomicU64, Ordering, fence};
use std::sync::Arc;

use parking_lot::RwLock;

use super::RcuFlavor;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sentinel epoch value for offline (or unregistered) threads.
const EPOCH_OFFLINE: u64 = 0;

/// Writers spin this many rounds per reader before yielding the CPU, so that
/// oversubscribed hosts still make progress.
const SPINS_BEFORE_YIELD: u32 = 128;

// ---------------------------------------------------------------------------
// Per-thread reader state
// ---------------------------------------------------------------------------

/// Per-thread reader state, padded to a full cache line.
///
/// The `epoch` field is written by its owning thread at quiescent points and
/// read by writers during `synchronize`.
#[derive(Debug)]
#[repr(C, align(64))]
struct ReaderSlot {
    epoch: AtomicU64,
}

/// Registration token handed to each thread.
#[derive(Debug)]
pub struct QsbrReader {
    slot: Arc<ReaderSlot>,
}

impl QsbrReader {
    /// Whether the thread currently participates in grace-period tracking.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.slot.epoch.load(Ordering::Acquire) != EPOCH_OFFLINE
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// A QSBR domain. Each instance tracks its own readers.
#[derive(Debug)]
pub struct Qsbr {
    global_epoch: AtomicU64,
    readers: RwLock<Vec<Arc<ReaderSlot>>>,
}

impl Default for Qsbr {
    fn default() -> Self {
        Self::new()
    }
}

impl Qsbr {
    #[must_use]
    pub fn new() -> Self {
        Self {
            global_epoch: AtomicU64::new(1),
            readers: RwLock::new(Vec::new()),
        }
    }

    /// Number of registered threads.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.readers.read().len()
    }

    /// Current global epoch (starts at 1, +1 per grace period).
    #[must_use]
    pub fn global_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::Acquire)
    }

    fn wait_for_readers(&self, target: u64) {
        let readers = self.readers.read();
        for slot in readers.iter() {
            let mut spins = 0u32;
            loop {
                let epoch = slot.epoch.load(Ordering::Acquire);
                if epoch == EPOCH_OFFLINE || epoch >= target {
                    break;
                }
                if spins < SPINS_BEFORE_YIELD {
                    spins += 1;
                    core::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }
}

impl RcuFlavor for Qsbr {
    type Reader = QsbrReader;

    fn name(&self) -> &'static str {
        "qsbr"
    }

    /// Register the calling thread. It starts online at the current epoch.
    fn register_thread(&self) -> QsbrReader {
        let slot = Arc::new(ReaderSlot {
            epoch: AtomicU64::new(self.global_epoch.load(Ordering::Acquire)),
        });
        self.readers.write().push(Arc::clone(&slot));
        fence(Ordering::SeqCst);
        QsbrReader { slot }
    }

    /// Unregister. The slot goes offline before it leaves the registry so a
    /// concurrent writer never waits on it.
    fn unregister_thread(&self, reader: QsbrReader) {
        reader.slot.epoch.store(EPOCH_OFFLINE, Ordering::Release);
        self.readers
            .write()
            .retain(|slot| !Arc::ptr_eq(slot, &reader.slot));
    }

    #[inline(always)]
    fn read_lock(&self, _reader: &QsbrReader) {
        // No-op in QSBR. Readers are implicitly protected.
    }

    #[inline(always)]
    fn read_unlock(&self, _reader: &QsbrReader) {
        // No-op in QSBR. Protection ends at the next quiescent state.
    }

    /// Wait for a full grace period.
    ///
    /// The caller's own slot counts as offline for the duration of the wait
    /// and is restored afterwards, so a registered thread never waits on
    /// itself.
    fn synchronize(&self, me: &QsbrReader) {
        let prev = me.slot.epoch.swap(EPOCH_OFFLINE, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let target = self.global_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.wait_for_readers(target);

        fence(Ordering::SeqCst);
        if prev != EPOCH_OFFLINE {
            me.slot
                .epoch
                .store(self.global_epoch.load(Ordering::Acquire), Ordering::SeqCst);
            fence(Ordering::SeqCst);
        }
    }

    /// Announce that the calling thread holds no RCU-protected references.
    #[inline]
    fn quiescent_state(&self, me: &QsbrReader) {
        fence(Ordering::SeqCst);
        let ge = self.global_epoch.load(Ordering::Acquire);
        me.slot.epoch.store(ge, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    fn supports_offline(&self) -> bool {
        true
    }

    fn thread_offline(&self, me: &QsbrReader) {
        fence(Ordering::SeqCst);
        me.slot.epoch.store(EPOCH_OFFLINE, Ordering::Release);
    }

    fn thread_online(&self, me: &QsbrReader) {
        let ge = self.global_epoch.load(Ordering::Acquire);
        me.slot.epoch.store(ge, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
