//! Flavor primitive benchmarks.
//!
//! Measures single-threaded cost of an empty read-side critical section,
//! of a dereference inside one, and of an uncontended grace period.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rcutorture_core::affinity::{PinOutcome, pin_current_thread};
use rcutorture_core::flavor::{CurrentSlot, Qsbr, RcuFlavor, RwLockRcu};

#[derive(Default)]
struct BenchStats {
    samples_ns_per_op: Vec<f64>,
}

impl BenchStats {
    fn record(&mut self, iters: u64, dur: Duration) {
        self.samples_ns_per_op
            .push(dur.as_nanos() as f64 / iters as f64);
    }

    fn report(&self, flavor: &str, bench: &str) {
        let mut samples = self.samples_ns_per_op.clone();
        if samples.is_empty() {
            return;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p50 = samples[(samples.len() - 1) / 2];
        let p99 = samples[((samples.len() - 1) as f64 * 0.99).round() as usize];
        println!(
            "FLAVOR_BENCH flavor={flavor} bench={bench} samples={} p50_ns_op={p50:.3} p99_ns_op={p99:.3}",
            samples.len()
        );
    }
}

fn maybe_pin_thread() {
    if std::env::var("RCUTORTURE_BENCH_PIN").ok().as_deref() != Some("1") {
        return;
    }
    match pin_current_thread(0) {
        PinOutcome::Pinned { cpu } => println!("FLAVOR_BENCH_META pinned_to_cpu={cpu}"),
        PinOutcome::Failed { errno, .. } => {
            eprintln!("FLAVOR_BENCH_META pinning_failed errno={errno}");
        }
        PinOutcome::Unpinned => {}
    }
}

fn measure<W: FnMut()>(
    group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
    flavor: &str,
    bench: &str,
    mut work: W,
) {
    let stats = RefCell::new(BenchStats::default());
    group.bench_function(BenchmarkId::new(bench, flavor), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                work();
            }
            let dur = start.elapsed().max(Duration::from_nanos(1));
            stats.borrow_mut().record(iters, dur);
            dur
        });
    });
    stats.borrow().report(flavor, bench);
}

fn bench_one<F: RcuFlavor>(c: &mut Criterion, flavor: F) {
    let name = flavor.name();
    let me = flavor.register_thread();
    let current = CurrentSlot::new(0);

    let mut group = c.benchmark_group("flavor");
    group.throughput(Throughput::Elements(1));

    measure(&mut group, name, "read_section", || {
        flavor.read_lock(&me);
        flavor.read_unlock(&me);
    });
    measure(&mut group, name, "read_dereference", || {
        flavor.read_lock(&me);
        black_box(flavor.dereference(&current));
        flavor.read_unlock(&me);
    });
    measure(&mut group, name, "synchronize", || {
        flavor.synchronize(&me);
    });

    group.finish();
    flavor.thread_offline(&me);
    flavor.unregister_thread(me);
}

fn bench_flavors(c: &mut Criterion) {
    maybe_pin_thread();
    bench_one(c, Qsbr::new());
    bench_one(c, RwLockRcu::new());
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(100))
        .measurement_time(Duration::from_secs(2))
        .sample_size(100);
    targets = bench_flavors
);
criterion_main!(benches);
