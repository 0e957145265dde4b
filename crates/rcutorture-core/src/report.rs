//! Report rendering.
//!
//! Both reports are plain data (`Serialize`) whose `Display` impls produce
//! the exact two-line text format consumed by existing tooling.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::tally::{StressCounts, Totals, WorkerTally};

/// A finished run: the rendered report plus the raw per-worker tallies it
/// was merged from.
#[derive(Debug, Clone)]
pub struct RunResult<R> {
    pub report: R,
    pub tallies: Vec<WorkerTally>,
}

// ---------------------------------------------------------------------------
// Performance report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfReport {
    pub n_reads: u64,
    pub n_updates: u64,
    pub nreaders: usize,
    pub nupdaters: usize,
    pub duration_secs: u64,
    pub ns_per_read: f64,
    pub ns_per_update: f64,
}

impl PerfReport {
    #[must_use]
    pub fn from_totals(totals: &Totals, duration: Duration) -> Self {
        Self {
            n_reads: totals.n_reads,
            n_updates: totals.n_updates,
            nreaders: totals.nreaders,
            nupdaters: totals.nupdaters,
            duration_secs: duration.as_secs(),
            ns_per_read: ns_per_op(duration, totals.nreaders, totals.n_reads),
            ns_per_update: ns_per_op(duration, totals.nupdaters, totals.n_updates),
        }
    }
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "n_reads: {}  n_updates: {}  nreaders: {}  nupdaters: {} duration: {}",
            self.n_reads, self.n_updates, self.nreaders, self.nupdaters, self.duration_secs
        )?;
        write!(
            f,
            "ns/read: {}  ns/update: {}",
            GFloat(self.ns_per_read),
            GFloat(self.ns_per_update)
        )
    }
}

/// Wall-clock nanoseconds per operation per thread of a role.
///
/// A role with no threads has no rate (NaN). A role whose threads completed
/// no operation is infinitely slow.
#[must_use]
pub fn ns_per_op(duration: Duration, threads: usize, ops: u64) -> f64 {
    if threads == 0 {
        return f64::NAN;
    }
    duration.as_secs_f64() * 1e9 * threads as f64 / ops as f64
}

// ---------------------------------------------------------------------------
// Stress report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub n_reads: u64,
    pub n_updates: u64,
    pub n_mberror: u64,
    pub rcu_stress_count: StressCounts,
}

impl StressReport {
    #[must_use]
    pub fn from_totals(totals: &Totals) -> Self {
        Self {
            n_reads: totals.n_reads,
            n_updates: totals.n_updates,
            n_mberror: totals.n_mberror,
            rcu_stress_count: totals.stress_count,
        }
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "n_reads: {}  n_updates: {}  n_mberror: {}",
            self.n_reads, self.n_updates, self.n_mberror
        )?;
        f.write_str("rcu_stress_count:")?;
        for n in &self.rcu_stress_count {
            write!(f, " {n}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// %g formatting
// ---------------------------------------------------------------------------

/// Renders an `f64` the way C's `%g` does: six significant digits, trailing
/// zeros removed, exponent form outside `[1e-4, 1e6)`.
#[derive(Debug, Clone, Copy)]
pub struct GFloat(pub f64);

const G_PRECISION: i32 = 6;

impl fmt::Display for GFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v.is_nan() {
            return f.write_str("nan");
        }
        if v.is_infinite() {
            return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
        }
        if v == 0.0 {
            return f.write_str("0");
        }

        // Round to the target precision first; rounding can bump the exponent.
        let sci = format!("{:.*e}", (G_PRECISION - 1) as usize, v);
        let (mantissa, exp) = sci.split_once('e').ok_or(fmt::Error)?;
        let exp: i32 = exp.parse().map_err(|_| fmt::Error)?;

        if exp < -4 || exp >= G_PRECISION {
            let sign = if exp < 0 { '-' } else { '+' };
            write!(f, "{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
        } else {
            let decimals = (G_PRECISION - 1 - exp) as usize;
            let fixed = format!("{v:.decimals$}");
            f.write_str(trim_fraction(&fixed))
        }
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
