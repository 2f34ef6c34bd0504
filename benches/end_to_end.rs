//! Benchmarks for graph construction and the simulator hot loop.
//!
//! The simulator dominates the mapping search (every trial is a full
//! run), so its per-run cost is what bounds search time on real DFGs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ecgra::dfg::toys;
use ecgra::Simulator;

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    group.bench_function("chain_12", |b| b.iter(|| toys::chain_n(black_box(10))));
    group.bench_function("ring_7", |b| b.iter(toys::ring));
    group.finish();
}

fn bench_simulate(c: &mut Criterion) {
    let chain = toys::chain_n(10);
    let ring = toys::ring();
    let mut sim = Simulator::new(false);

    let mut group = c.benchmark_group("simulate");
    group.bench_function("chain_12_50_tokens", |b| {
        b.iter(|| sim.run(black_box(&chain), 50).unwrap())
    });
    group.bench_function("ring_7_50_tokens", |b| {
        b.iter(|| sim.run(black_box(&ring), 50).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_graph_build, bench_simulate);
criterion_main!(benches);
