//! The fixed pool of worker threads for one run.

use std::thread::JoinHandle;

use crate::error::TortureError;
use crate::phase::PhaseController;
use crate::tally::{Role, WorkerTally};

/// Slots reserved up front; larger crews grow the `Vec` as they spawn.
const PREALLOC_LIMIT: usize = 1024;

struct Member {
    role: Role,
    index: usize,
    handle: JoinHandle<WorkerTally>,
}

/// Worker threads spawned before the measurement window. Each thread
/// returns its own tally, which is the only way tallies leave a worker.
#[derive(Default)]
pub struct Crew {
    members: Vec<Member>,
}

impl Crew {
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            members: Vec::with_capacity(n.min(PREALLOC_LIMIT)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Spawn one named worker thread.
    pub fn spawn<W>(&mut self, role: Role, index: usize, work: W) -> Result<(), TortureError>
    where
        W: FnOnce() -> WorkerTally + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("{}-{index}", role.name()))
            .spawn(work)
            .map_err(|source| TortureError::Spawn {
                role: role.name(),
                index,
                source,
            })?;
        self.members.push(Member {
            role,
            index,
            handle,
        });
        Ok(())
    }

    /// Tear down a partially spawned crew.
    ///
    /// Moves `ctl` to `Stop` so workers parked at the gate leave without
    /// running, then joins them. Their tallies are discarded.
    pub fn abandon(self, ctl: &PhaseController) {
        ctl.abort();
        for m in self.members {
            let _ = m.handle.join();
        }
    }

    /// Join every worker, in spawn order.
    ///
    /// All threads are joined even if one of them panicked; the first panic
    /// is reported.
    pub fn join_all(self) -> Result<Vec<WorkerTally>, TortureError> {
        let mut tallies = Vec::with_capacity(self.members.len());
        let mut first_panic = None;
        for m in self.members {
            match m.handle.join() {
                Ok(t) => tallies.push(t),
                Err(_) => {
                    first_panic.get_or_insert(TortureError::WorkerPanicked {
                        role: m.role.name(),
                        index: m.index,
                    });
                }
            }
        }
        match first_panic {
            Some(err) => Err(err),
            None => Ok(tallies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_returns_tallies_in_spawn_order() {
        let mut crew = Crew::with_capacity(3);
        for i in 0..3 {
            crew.spawn(Role::PerfReader, i, move || {
                let mut t = WorkerTally::new(Role::PerfReader, i);
                t.n_reads = (i as u64 + 1) * 1000;
                t
            })
            .unwrap();
        }
        assert_eq!(crew.len(), 3);
        let tallies = crew.join_all().unwrap();
        let reads: Vec<u64> = tallies.iter().map(|t| t.n_reads).collect();
        assert_eq!(reads, vec![1000, 2000, 3000]);
    }

    #[test]
    fn abandoned_crew_never_enters_run() {
        use crate::phase::Phase;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ctl = Arc::new(PhaseController::new());
        let saw_run = Arc::new(AtomicUsize::new(0));
        ctl.arm(3);
        let mut crew = Crew::with_capacity(3);
        for i in 0..2 {
            let (ctl, saw_run) = (Arc::clone(&ctl), Arc::clone(&saw_run));
            crew.spawn(Role::PerfReader, i, move || {
                ctl.check_in();
                if ctl.wait_for_run() == Phase::Run {
                    saw_run.fetch_add(1, Ordering::SeqCst);
                }
                WorkerTally::new(Role::PerfReader, i)
            })
            .unwrap();
        }
        while ctl.checked_in() < 2 {
            std::thread::yield_now();
        }

        // As after a failed third spawn: release the two parked workers.
        crew.abandon(&ctl);
        assert_eq!(ctl.phase(), Phase::Stop);

        // A reused controller starts clean; no orphan joins the next window.
        ctl.arm(0);
        ctl.start();
        ctl.stop();
        assert_eq!(ctl.checked_in(), 0);
        assert_eq!(saw_run.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn huge_crews_do_not_preallocate() {
        let crew = Crew::with_capacity(usize::MAX);
        assert!(crew.is_empty());
    }

    #[test]
    fn panicking_worker_is_reported() {
        let mut crew = Crew::default();
        crew.spawn(Role::PerfUpdater, 0, || WorkerTally::new(Role::PerfUpdater, 0))
            .unwrap();
        crew.spawn(Role::FakeUpdater, 1, || panic!("boom")).unwrap();
        let err = crew.join_all().unwrap_err();
        assert!(matches!(
            err,
            TortureError::WorkerPanicked {
                role: "fake-updater",
                index: 1
            }
        ));
    }
}
