//! Reader-writer-lock flavor.
//!
//! Read-side critical sections take the lock shared; a grace period is one
//! exclusive acquire/release, which cannot succeed while any reader is
//! inside. Outermost sections queue behind a waiting writer so updaters are
//! not starved; nested sections take the lock recursively so they cannot
//! deadlock against that same writer.

use std::cell::Cell;

use parking_lot::RawRwLock;
use parking_lot::lock_api::{RawRwLock as _, RawRwLockRecursive as _};

use super::RcuFlavor;

pub struct RwLockRcu {
    lock: RawRwLock,
}

impl std::fmt::Debug for RwLockRcu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLockRcu")
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

impl Default for RwLockRcu {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLockRcu {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: RawRwLock::INIT,
        }
    }
}

/// Per-thread nesting depth of read-side critical sections.
#[derive(Debug, Default)]
pub struct RwLockReader {
    depth: Cell<u32>,
}

impl RcuFlavor for RwLockRcu {
    type Reader = RwLockReader;

    fn name(&self) -> &'static str {
        "rwlock"
    }

    fn register_thread(&self) -> RwLockReader {
        RwLockReader::default()
    }

    fn unregister_thread(&self, reader: RwLockReader) {
        debug_assert_eq!(reader.depth.get(), 0, "unregistered inside a read section");
    }

    #[inline]
    fn read_lock(&self, me: &RwLockReader) {
        let depth = me.depth.get();
        if depth == 0 {
            self.lock.lock_shared();
        } else {
            self.lock.lock_shared_recursive();
        }
        me.depth.set(depth + 1);
    }

    #[inline]
    fn read_unlock(&self, me: &RwLockReader) {
        let depth = me.depth.get();
        debug_assert!(depth > 0, "read_unlock without read_lock");
        me.depth.set(depth - 1);
        // SAFETY: every read_unlock is paired with a preceding read_lock on
        // the same thread, so a shared lock is held here.
        unsafe { self.lock.unlock_shared() };
    }

    fn synchronize(&self, _me: &RwLockReader) {
        self.lock.lock_exclusive();
        // SAFETY: acquired on the line above.
        unsafe { self.lock.unlock_exclusive() };
    }

    fn nestable(&self) -> bool {
        true
    }
}
