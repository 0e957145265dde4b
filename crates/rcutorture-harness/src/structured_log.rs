//! Structured logging for torture runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required and optional fields.
//! - [`ArtifactIndex`]: links a run's log to its artifacts with SHA-256 digests.
//! - [`LogEmitter`]: writes JSONL lines to a file, a buffer, or nowhere.
//! - [`validate_log_line`]: checks a single JSONL line against the schema.
//! - [`validate_log_file`]: checks an entire JSONL file.
//!
//! Log records never go to stdout; stdout carries only the report.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Completed with no ordering violation.
    Pass,
    /// Completed, but readers observed uninitialized slots.
    Fail,
    /// Did not complete.
    Error,
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MODES: [&str; 4] = ["perf", "rperf", "uperf", "stress"];
const FLAVORS: [&str; 2] = ["qsbr", "rwlock"];
const OUTCOMES: [&str; 3] = ["pass", "fail", "error"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    /// Worker role name (e.g. `perf-reader`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Worker index within the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the whole run (milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            mode: None,
            flavor: None,
            role: None,
            worker: None,
            outcome: None,
            exit_code: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    /// Set the test mode and flavor.
    #[must_use]
    pub fn with_run(mut self, mode: impl Into<String>, flavor: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self.flavor = Some(flavor.into());
        self
    }

    /// Set the worker this entry concerns.
    #[must_use]
    pub fn with_worker(mut self, role: impl Into<String>, index: usize) -> Self {
        self.role = Some(role.into());
        self.worker = Some(index);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

/// A single artifact entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Artifact index for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Add an artifact entry.
    pub fn add(
        &mut self,
        path: impl Into<String>,
        kind: impl Into<String>,
        sha256: impl Into<String>,
        size_bytes: Option<u64>,
    ) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256.into(),
            size_bytes,
        });
        self
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Shared in-memory sink, readable after the emitter is done with it.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

struct BufferWriter(SharedBuffer);

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries to one or more sinks.
pub struct LogEmitter {
    writers: Vec<Box<dyn Write>>,
    seq: u64,
    run_tag: String,
    run_id: String,
}

impl LogEmitter {
    /// An emitter with no sinks; entries are built and dropped.
    #[must_use]
    pub fn disabled(run_tag: &str, run_id: &str) -> Self {
        Self {
            writers: Vec::new(),
            seq: 0,
            run_tag: run_tag.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Create an emitter that writes to a shared buffer (for testing).
    #[must_use]
    pub fn to_buffer(run_tag: &str, run_id: &str) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let mut emitter = Self::disabled(run_tag, run_id);
        emitter.add_buffer(Arc::clone(&buffer));
        (emitter, buffer)
    }

    /// Also write every entry to `path` (truncated).
    pub fn add_file(&mut self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.writers.push(Box::new(std::io::BufWriter::new(file)));
        Ok(())
    }

    pub fn add_buffer(&mut self, buffer: SharedBuffer) {
        self.writers.push(Box::new(BufferWriter(buffer)));
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.run_tag, self.run_id, self.seq)
    }

    /// Start an entry carrying the next trace ID.
    #[must_use]
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        let trace_id = self.next_trace_id();
        LogEntry::new(trace_id, level, event)
    }

    /// Emit a bare entry with an auto-generated trace ID.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = self.entry(level, event);
        self.write_line(&entry)?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        self.write_line(&entry)
    }

    fn write_line(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        if self.writers.is_empty() {
            return Ok(());
        }
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        for w in &mut self.writers {
            writeln!(w, "{line}")?;
        }
        Ok(())
    }

    /// Flush every sink.
    pub fn flush(&mut self) -> std::io::Result<()> {
        for w in &mut self.writers {
            w.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("sinks", &self.writers.len())
            .field("seq", &self.seq)
            .field("run_tag", &self.run_tag)
            .field("run_id", &self.run_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn check_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
    line_number: usize,
    errors: &mut Vec<LogValidationError>,
) {
    if let Some(value) = obj.get(field).and_then(|v| v.as_str())
        && !allowed.contains(&value)
    {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message: format!("invalid {field}: '{value}'"),
        });
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<json>".to_string(),
                message: format!("invalid JSON: {e}"),
            });
            return Err(errors);
        }
    };

    let Some(obj) = value.as_object() else {
        errors.push(LogValidationError {
            line_number,
            field: "<root>".to_string(),
            message: "expected JSON object".to_string(),
        });
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(LogValidationError {
                line_number,
                field: field.to_string(),
                message: "required field missing".to_string(),
            });
        }
    }

    check_enum(obj, "level", &LEVELS, line_number, &mut errors);
    check_enum(obj, "mode", &MODES, line_number, &mut errors);
    check_enum(obj, "flavor", &FLAVORS, line_number, &mut errors);
    check_enum(obj, "outcome", &OUTCOMES, line_number, &mut errors);

    // A worker index without a role cannot be attributed.
    if obj.contains_key("worker") && !obj.contains_key("role") {
        errors.push(LogValidationError {
            line_number,
            field: "role".to_string(),
            message: "worker index present without role".to_string(),
        });
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        errors.push(LogValidationError {
            line_number,
            field: "trace_id".to_string(),
            message: format!(
                "trace_id should follow <run_tag>::<run_id>::<seq> format, got: '{trace_id}'"
            ),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<deserialization>".to_string(),
            message: format!("failed to deserialize: {e}"),
        }]
    })
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn now_utc() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(now.as_secs(), now.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
