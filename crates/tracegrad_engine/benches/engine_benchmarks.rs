//! Criterion benchmarks for tracegrad_engine.
//!
//! Measures untraced evaluation against reverse-mode, forward-mode and
//! nested differentiation of the same functions across input sizes, to
//! characterise the tracing overhead.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracegrad_engine::checkpoint::checkpoint;
use tracegrad_engine::{grad, hessian, jvp, AutodiffResult, Var};

/// Generate an input vector of length `n`.
fn generate_input(n: usize) -> Var {
    Var::vector((0..n).map(|i| (i as f64 / n as f64) - 0.5).collect())
}

/// A small elementwise network layer followed by a reduction.
fn layer(x: &Var) -> AutodiffResult<Var> {
    x.tanh()?.mul(x)?.add(&x.sin()?)?.square()?.sum()
}

/// Benchmark untraced evaluation against gradient computation.
fn bench_reverse_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse_mode");

    for size in [10, 100, 1000] {
        let x = generate_input(size);

        group.bench_with_input(BenchmarkId::new("untraced", size), &x, |b, x| {
            b.iter(|| layer(black_box(x)).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("grad", size), &x, |b, x| {
            let df = grad(layer);
            b.iter(|| df(black_box(x)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark forward-mode directional derivatives.
fn bench_forward_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_mode");

    for size in [10, 100, 1000] {
        let x = generate_input(size);
        let v = x.ones_like();

        group.bench_with_input(BenchmarkId::new("jvp", size), &(&x, &v), |b, (x, v)| {
            b.iter(|| jvp(layer, black_box(x), black_box(v)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark a long scalar chain, dominated by per-node overhead.
fn bench_scalar_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalar_chain");

    for depth in [100, 1000] {
        let chain = move |x: &Var| -> AutodiffResult<Var> {
            let mut y = x.clone();
            for _ in 0..depth {
                y = y.sin()?.add(x)?;
            }
            Ok(y)
        };

        group.bench_with_input(BenchmarkId::new("grad", depth), &depth, |b, _| {
            let df = grad(chain);
            b.iter(|| df(black_box(&Var::scalar(0.3))).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("checkpointed", depth), &depth, |b, _| {
            let block = checkpoint(chain);
            let df = grad(move |x: &Var| block.call(x));
            b.iter(|| df(black_box(&Var::scalar(0.3))).unwrap());
        });
    }

    group.finish();
}

/// Benchmark nested differentiation.
fn bench_hessian(c: &mut Criterion) {
    let mut group = c.benchmark_group("hessian");

    for size in [4, 16] {
        let x = generate_input(size);
        group.bench_with_input(BenchmarkId::new("dense", size), &x, |b, x| {
            let h = hessian(layer);
            b.iter(|| h(black_box(x)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reverse_mode,
    bench_forward_mode,
    bench_scalar_chain,
    bench_hessian
);
criterion_main!(benches);
