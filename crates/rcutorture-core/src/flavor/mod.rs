//! The RCU primitive under test, as a capability trait.
//!
//! Workers are generic over [`RcuFlavor`]; a flavor is injected once as an
//! `Arc<F>` and shared by every worker of a run. Optional capabilities
//! (quiescent-state hints, offline/online) have no-op defaults and are detected
//! with [`RcuFlavor::supports_offline`].

use core::sync::atomic::{AtomicUsize, Ordering};

pub mod qsbr;
#[allow(unsafe_code)]
pub mod rwlock;

pub use qsbr::Qsbr;
pub use rwlock::RwLockRcu;

/// The single shared handle naming the current slot of the stress ring.
///
/// Only [`RcuFlavor::publish`] writes it and only
/// [`RcuFlavor::dereference`] reads it.
#[derive(Debug, Default)]
pub struct CurrentSlot(AtomicUsize);

impl CurrentSlot {
    #[must_use]
    pub const fn new(slot: usize) -> Self {
        Self(AtomicUsize::new(slot))
    }
}

/// Operations a primitive must expose to be tortured.
pub trait RcuFlavor: Send + Sync + 'static {
    /// Per-thread registration state, created by [`register_thread`] and
    /// threaded through every other call made by that thread.
    ///
    /// [`register_thread`]: RcuFlavor::register_thread
    type Reader: Send;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    fn register_thread(&self) -> Self::Reader;
    fn unregister_thread(&self, reader: Self::Reader);

    /// Enter a read-side critical section. Must not block indefinitely.
    fn read_lock(&self, reader: &Self::Reader);
    /// Exit a read-side critical section.
    fn read_unlock(&self, reader: &Self::Reader);

    /// Wait for a grace period: every read-side critical section active at
    /// call time has exited on return.
    fn synchronize(&self, reader: &Self::Reader);

    /// Make `slot` current for subsequent dereferences.
    fn publish(&self, current: &CurrentSlot, slot: usize) {
        current.0.store(slot, Ordering::Release);
    }

    /// Read the current slot; the result is valid until the enclosing
    /// read-side critical section ends.
    #[inline]
    fn dereference(&self, current: &CurrentSlot) -> usize {
        current.0.load(Ordering::Acquire)
    }

    /// The calling thread holds no read-side references.
    #[inline]
    fn quiescent_state(&self, _reader: &Self::Reader) {}

    /// Whether [`thread_offline`](RcuFlavor::thread_offline) and
    /// [`thread_online`](RcuFlavor::thread_online) do anything.
    fn supports_offline(&self) -> bool {
        false
    }

    fn thread_offline(&self, _reader: &Self::Reader) {}
    fn thread_online(&self, _reader: &Self::Reader) {}

    /// Whether read-side critical sections may nest.
    fn nestable(&self) -> bool {
        false
    }
}
