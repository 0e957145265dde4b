//! Per-thread accumulators and the post-join merge.
//!
//! Each worker owns one [`WorkerTally`] for the whole run and hands it back
//! through its join handle. Nothing else reads or writes a tally before that
//! point, so the measured loops never touch a shared counter. [`Totals`] is
//! built once from the joined tallies and is immutable afterwards.

use crate::affinity::PinOutcome;
use crate::stress::PIPE_LEN;

/// Staleness histogram: bucket `i` counts reads that observed pipe-count `i`.
/// The last bucket also absorbs every out-of-range observation.
pub type StressCounts = [u64; PIPE_LEN + 1];

/// Worker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    PerfReader,
    PerfUpdater,
    StressReader,
    StressUpdater,
    FakeUpdater,
}

impl Role {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PerfReader => "perf-reader",
            Self::PerfUpdater => "perf-updater",
            Self::StressReader => "stress-reader",
            Self::StressUpdater => "stress-updater",
            Self::FakeUpdater => "fake-updater",
        }
    }

    #[must_use]
    pub const fn is_reader(self) -> bool {
        matches!(self, Self::PerfReader | Self::StressReader)
    }

    /// Real updaters only; fake updaters never mutate state and are not
    /// counted as updaters in reports.
    #[must_use]
    pub const fn is_updater(self) -> bool {
        matches!(self, Self::PerfUpdater | Self::StressUpdater)
    }
}

/// Thread-exclusive counters for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTally {
    pub role: Role,
    pub index: usize,
    pub pin: PinOutcome,
    pub n_reads: u64,
    pub n_updates: u64,
    pub n_mberror: u64,
    pub stress_count: StressCounts,
}

impl WorkerTally {
    #[must_use]
    pub fn new(role: Role, index: usize) -> Self {
        Self {
            role,
            index,
            pin: PinOutcome::Unpinned,
            n_reads: 0,
            n_updates: 0,
            n_mberror: 0,
            stress_count: [0; PIPE_LEN + 1],
        }
    }

    /// Count one stress read that observed `pipe_count`.
    #[inline]
    pub fn record_stress_read(&mut self, pipe_count: i64) {
        self.stress_count[clamp_pipe_count(pipe_count)] += 1;
        self.n_reads += 1;
    }
}

/// Map an observed pipe-count into `[0, PIPE_LEN]`; anything outside the
/// range lands in the overflow bucket.
#[inline]
#[must_use]
pub fn clamp_pipe_count(pipe_count: i64) -> usize {
    match usize::try_from(pipe_count) {
        Ok(pc) if pc <= PIPE_LEN => pc,
        _ => PIPE_LEN,
    }
}

/// Global totals, merged once after every worker has joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub n_reads: u64,
    pub n_updates: u64,
    pub n_mberror: u64,
    pub nreaders: usize,
    pub nupdaters: usize,
    pub nfake_updaters: usize,
    pub stress_count: StressCounts,
}

impl Totals {
    #[must_use]
    pub fn merge(tallies: &[WorkerTally]) -> Self {
        let mut totals = Self {
            n_reads: 0,
            n_updates: 0,
            n_mberror: 0,
            nreaders: 0,
            nupdaters: 0,
            nfake_updaters: 0,
            stress_count: [0; PIPE_LEN + 1],
        };
        for t in tallies {
            totals.n_reads += t.n_reads;
            totals.n_updates += t.n_updates;
            totals.n_mberror += t.n_mberror;
            for (sum, n) in totals.stress_count.iter_mut().zip(t.stress_count) {
                *sum += n;
            }
            if t.role.is_reader() {
                totals.nreaders += 1;
            } else if t.role.is_updater() {
                totals.nupdaters += 1;
            } else {
                totals.nfake_updaters += 1;
            }
        }
        totals
    }

    /// Sum of the staleness histogram; equals `n_reads` for a stress run.
    #[must_use]
    pub fn stress_count_sum(&self) -> u64 {
        self.stress_count.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_in_range_values() {
        assert_eq!(clamp_pipe_count(0), 0);
        assert_eq!(clamp_pipe_count(1), 1);
        assert_eq!(clamp_pipe_count(PIPE_LEN as i64), PIPE_LEN);
    }

    #[test]
    fn clamp_sends_out_of_range_to_overflow_bucket() {
        assert_eq!(clamp_pipe_count(-1), PIPE_LEN);
        assert_eq!(clamp_pipe_count(PIPE_LEN as i64 + 1), PIPE_LEN);
        assert_eq!(clamp_pipe_count(i64::MAX), PIPE_LEN);
    }

    #[test]
    fn merge_conserves_counts() {
        let mut r0 = WorkerTally::new(Role::PerfReader, 0);
        r0.n_reads = 3000;
        let mut r1 = WorkerTally::new(Role::PerfReader, 1);
        r1.n_reads = 5000;
        let mut u = WorkerTally::new(Role::PerfUpdater, 2);
        u.n_updates = 17;

        let totals = Totals::merge(&[r0, r1, u]);
        assert_eq!(totals.n_reads, 8000);
        assert_eq!(totals.n_updates, 17);
        assert_eq!(totals.nreaders, 2);
        assert_eq!(totals.nupdaters, 1);
        assert_eq!(totals.nfake_updaters, 0);
    }

    #[test]
    fn merge_sums_histograms_bucketwise() {
        let mut a = WorkerTally::new(Role::StressReader, 0);
        let mut b = WorkerTally::new(Role::StressReader, 1);
        for pc in [0, 0, 1, 2, 99] {
            a.record_stress_read(pc);
        }
        for pc in [0, 1, 1, -4] {
            b.record_stress_read(pc);
        }
        b.n_mberror = 2;
        let fake = WorkerTally::new(Role::FakeUpdater, 2);

        let totals = Totals::merge(&[a, b, fake]);
        assert_eq!(totals.n_reads, 9);
        assert_eq!(totals.stress_count_sum(), totals.n_reads);
        assert_eq!(totals.stress_count[0], 3);
        assert_eq!(totals.stress_count[1], 3);
        assert_eq!(totals.stress_count[2], 1);
        assert_eq!(totals.stress_count[PIPE_LEN], 2);
        assert_eq!(totals.n_mberror, 2);
        assert_eq!(totals.nfake_updaters, 1);
        assert_eq!(totals.nupdaters, 0);
    }
}
