#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use bankers_core::Ledger;
use bankers_simulator::Simulation;

/// Whole lockstep runs, from initial allocation to every consumer settled.
fn benchmark_lockstep_run(c: &mut Criterion) {
    let seed = 42;
    let mut group = c.benchmark_group("lockstep_run");

    for consumers in [5, 32, 128] {
        group.bench_function(format!("consumers_{}", consumers), |b| {
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(seed);
                let ledger = Ledger::initialize(&[10, 5, 7], consumers, &mut rng).unwrap();
                black_box(Simulation::with_ledger(ledger, seed).run_lockstep().unwrap());
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_lockstep_run);
criterion_main!(benches);
