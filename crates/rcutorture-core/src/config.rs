//! Run configuration.
//!
//! Positional arguments come from the command line. Two settings may also be
//! supplied through the environment:
//! - `RCUTORTURE_FLAVOR`: `qsbr` (default) or `rwlock`.
//! - `RCUTORTURE_DURATION`: measurement window in whole seconds.
//!
//! Command-line values win over the environment. Unparseable environment
//! values fall back to the defaults rather than failing the run.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::stress::FAKE_UPDATERS;

pub const FLAVOR_ENV: &str = "RCUTORTURE_FLAVOR";
pub const DURATION_ENV: &str = "RCUTORTURE_DURATION";

/// Test mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Readers plus one updater.
    Perf,
    /// Readers only.
    Rperf,
    /// Updaters only.
    Uperf,
    /// Staleness/violation detection.
    Stress,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Perf => "perf",
            Self::Rperf => "rperf",
            Self::Uperf => "uperf",
            Self::Stress => "stress",
        }
    }

    #[must_use]
    pub const fn default_duration(self) -> Duration {
        match self {
            Self::Stress => Duration::from_secs(10),
            _ => Duration::from_secs(1),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perf" => Ok(Self::Perf),
            "rperf" => Ok(Self::Rperf),
            "uperf" => Ok(Self::Uperf),
            "stress" => Ok(Self::Stress),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Bundled primitive implementations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlavorKind {
    #[default]
    Qsbr,
    RwLock,
}

impl FlavorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qsbr => "qsbr",
            Self::RwLock => "rwlock",
        }
    }

    /// Parse from string (case-insensitive, with aliases).
    pub fn from_str_loose(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qsbr" | "urcu-qsbr" | "default" => Ok(Self::Qsbr),
            "rwlock" | "rw" | "rcu_rwlock" => Ok(Self::RwLock),
            _ => Err(ConfigError::UnknownFlavor(s.to_string())),
        }
    }
}

/// Parse a thread count or stride the way `strtoul(.., 0)` reads it:
/// decimal, `0x` hexadecimal, or leading-`0` octal.
pub fn parse_count(what: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let s = raw.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        usize::from_str_radix(&s[1..], 8)
    } else {
        s.parse::<usize>()
    };
    parsed.map_err(|_| ConfigError::InvalidCount {
        what,
        raw: raw.to_string(),
    })
}

/// Parse `nreaders`; the whole crew of a run (readers plus the stress
/// updaters) must still be countable.
fn parse_thread_count(raw: &str) -> Result<usize, ConfigError> {
    let n = parse_count("nreaders", raw)?;
    match n.checked_add(1 + FAKE_UPDATERS) {
        Some(_) => Ok(n),
        None => Err(ConfigError::InvalidCount {
            what: "nreaders",
            raw: raw.to_string(),
        }),
    }
}

/// Raw, unvalidated inputs for one run.
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs<'a> {
    pub nreaders: Option<&'a str>,
    pub mode: Option<&'a str>,
    pub cpustride: Option<&'a str>,
    pub duration_secs: Option<u64>,
    pub flavor: Option<&'a str>,
}

/// Fully resolved configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TortureConfig {
    pub mode: Mode,
    /// Readers for perf/rperf/stress, updaters for uperf.
    pub nthreads: usize,
    pub cpustride: usize,
    pub duration: Duration,
    pub flavor: FlavorKind,
}

impl Default for TortureConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Perf,
            nthreads: 1,
            cpustride: 1,
            duration: Mode::Perf.default_duration(),
            flavor: FlavorKind::default(),
        }
    }
}

impl TortureConfig {
    /// Resolve inputs against the process environment.
    pub fn resolve(inputs: &ConfigInputs<'_>) -> Result<Self, ConfigError> {
        Self::resolve_with_env(inputs, |key| std::env::var(key).ok())
    }

    /// Resolve inputs against an arbitrary environment lookup.
    pub fn resolve_with_env<E>(inputs: &ConfigInputs<'_>, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mode = match inputs.mode {
            Some(m) => m.parse()?,
            None => Mode::Perf,
        };
        let nthreads = match inputs.nreaders {
            Some(raw) => parse_thread_count(raw)?,
            None => 1,
        };
        let cpustride = match inputs.cpustride {
            Some(raw) => parse_count("cpustride", raw)?,
            None => 1,
        };
        let flavor = match inputs.flavor {
            Some(raw) => FlavorKind::from_str_loose(raw)?,
            None => env(FLAVOR_ENV)
                .and_then(|raw| FlavorKind::from_str_loose(&raw).ok())
                .unwrap_or_default(),
        };
        let duration = inputs
            .duration_secs
            .or_else(|| env(DURATION_ENV).and_then(|raw| raw.trim().parse().ok()))
            .map_or_else(|| mode.default_duration(), Duration::from_secs);

        Ok(Self {
            mode,
            nthreads,
            cpustride,
            duration,
            flavor,
        })
    }
}
