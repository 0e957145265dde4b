//! CLI entrypoint for rcutorture.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use clap::error::ErrorKind;

use rcutorture_core::TortureConfig;
use rcutorture_core::config::ConfigInputs;
use rcutorture_harness::artifacts::{self, RunRecord};
use rcutorture_harness::structured_log::LogEmitter;
use rcutorture_harness::{RUN_TAG, TortureRunner, USAGE};

/// Torture-test an RCU-style synchronization primitive.
#[derive(Debug, Parser)]
#[command(name = "rcutorture")]
#[command(about = "Performance and stress torture tests for RCU flavors")]
struct Cli {
    /// Reader count (perf, rperf, stress) or updater count (uperf).
    nreaders: Option<String>,
    /// perf | rperf | uperf | stress
    mode: Option<String>,
    /// Distance between CPUs workers are pinned to.
    cpustride: Option<String>,
    /// RCU flavor to test (qsbr or rwlock).
    #[arg(long)]
    flavor: Option<String>,
    /// Measurement window in seconds.
    #[arg(long)]
    duration: Option<u64>,
    /// Write structured JSONL log records to this file.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Write report.json, trace.jsonl and artifact_index.json here.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,
    /// Positionals past cpustride are ignored.
    #[arg(hide = true)]
    _rest: Vec<String>,
}

fn usage_error(detail: &dyn std::fmt::Display) -> ! {
    eprintln!("{USAGE}");
    eprintln!("rcutorture: {detail}");
    std::process::exit(1);
}

fn run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("run-{}-{millis}", std::process::id())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => usage_error(&err.kind()),
    };

    let inputs = ConfigInputs {
        nreaders: cli.nreaders.as_deref(),
        mode: cli.mode.as_deref(),
        cpustride: cli.cpustride.as_deref(),
        duration_secs: cli.duration,
        flavor: cli.flavor.as_deref(),
    };
    let config = match TortureConfig::resolve(&inputs) {
        Ok(config) => config,
        Err(err) => usage_error(&err),
    };

    let run_id = run_id();
    let mut log = LogEmitter::disabled(RUN_TAG, &run_id);
    if let Some(path) = &cli.log {
        log.add_file(path)?;
    }
    let mut runner = TortureRunner::new(config);
    if let Some(dir) = &cli.artifact_dir {
        let trace = artifacts::prepare(dir)?;
        log.add_file(&trace)?;
        runner = runner.with_artifact_refs(artifacts::artifact_refs());
    }

    let outcome = runner.run(&mut log)?;
    println!("{}", outcome.report);

    if let Some(dir) = &cli.artifact_dir {
        // Release the trace file before hashing it.
        drop(log);
        let record = RunRecord::new(&run_id, runner.config(), &outcome);
        artifacts::write_bundle(dir, &record)?;
    }
    Ok(())
}
