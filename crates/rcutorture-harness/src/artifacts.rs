//! On-disk run bundle.
//!
//! A bundle directory holds:
//! - `report.json`: the run configuration, outcome, report, and pin failures.
//! - `trace.jsonl`: the structured log of the run.
//! - `artifact_index.json`: SHA-256 and size of the two files above.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::Digest;

use rcutorture_core::TortureConfig;

use crate::error::HarnessError;
use crate::runner::{PinFailure, RunOutcome, RunReport};
use crate::structured_log::{ArtifactIndex, Outcome};

pub const REPORT_FILE: &str = "report.json";
pub const TRACE_FILE: &str = "trace.jsonl";
pub const INDEX_FILE: &str = "artifact_index.json";

/// Contents of `report.json`.
#[derive(Debug, Serialize)]
pub struct RunRecord<'a> {
    pub run_id: &'a str,
    pub mode: &'static str,
    pub flavor: &'static str,
    pub nthreads: usize,
    pub cpustride: usize,
    pub duration_secs: u64,
    pub elapsed_ms: u64,
    pub outcome: Outcome,
    pub report: &'a RunReport,
    pub pin_failures: &'a [PinFailure],
}

impl<'a> RunRecord<'a> {
    #[must_use]
    pub fn new(run_id: &'a str, config: &TortureConfig, run: &'a RunOutcome) -> Self {
        Self {
            run_id,
            mode: config.mode.as_str(),
            flavor: config.flavor.as_str(),
            nthreads: config.nthreads,
            cpustride: config.cpustride,
            duration_secs: config.duration.as_secs(),
            elapsed_ms: u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX),
            outcome: run.outcome(),
            report: &run.report,
            pin_failures: &run.pin_failures,
        }
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// SHA-256 of `data` as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex_lower(&sha2::Sha256::digest(data))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), HarnessError> {
    std::fs::write(path, bytes).map_err(|source| HarnessError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create the bundle directory and return the trace path the log should
/// write to.
pub fn prepare(dir: &Path) -> Result<PathBuf, HarnessError> {
    std::fs::create_dir_all(dir).map_err(|source| HarnessError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir.join(TRACE_FILE))
}

/// File names the run-completion event should reference.
#[must_use]
pub fn artifact_refs() -> Vec<String> {
    vec![REPORT_FILE.to_string(), TRACE_FILE.to_string()]
}

/// Write `report.json` and index it together with the already-flushed trace.
pub fn write_bundle(dir: &Path, record: &RunRecord<'_>) -> Result<ArtifactIndex, HarnessError> {
    let report = serde_json::to_string_pretty(record).map_err(|source| HarnessError::Json {
        what: "run record",
        source,
    })?;
    write_file(&dir.join(REPORT_FILE), report.as_bytes())?;

    let mut index = ArtifactIndex::new(record.run_id);
    for (name, kind) in [(REPORT_FILE, "report"), (TRACE_FILE, "log")] {
        let path = dir.join(name);
        let Ok(bytes) = std::fs::read(&path) else {
            // No trace when logging failed before the first line.
            continue;
        };
        index.add(
            name,
            kind,
            sha256_hex(&bytes),
            u64::try_from(bytes.len()).ok(),
        );
    }

    let json = index.to_json().map_err(|source| HarnessError::Json {
        what: "artifact index",
        source,
    })?;
    write_file(&dir.join(INDEX_FILE), json.as_bytes())?;
    Ok(index)
}
