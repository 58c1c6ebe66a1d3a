//! Registry lifetime of checkpoint primitives.
//!
//! Kept in its own test binary: it compares the global registry size before
//! and after, which concurrent tests registering primitives would disturb.

use tracegrad_engine::checkpoint::checkpoint;
use tracegrad_engine::registry;
use tracegrad_engine::{grad, hessian, AutodiffResult, Var};

fn block(x: &Var) -> AutodiffResult<Var> {
    x.sin()?.mul(x)?.exp()
}

/// Test building and differentiating checkpoints leaves the registry size unchanged.
#[test]
fn test_checkpoints_do_not_grow_registry() {
    let baseline = registry::global().len();

    for i in 0..50 {
        let wrapped = checkpoint(block);
        assert_eq!(registry::global().len(), baseline + 1);

        let x = Var::scalar(0.01 * i as f64);
        grad(|x: &Var| wrapped.call(x))(&x).unwrap();
        hessian(|x: &Var| wrapped.call(x))(&x).unwrap();
    }
    assert_eq!(registry::global().len(), baseline);

    let kept: Vec<_> = (0..10).map(|_| checkpoint(block)).collect();
    assert_eq!(registry::global().len(), baseline + 10);
    drop(kept);
    assert_eq!(registry::global().len(), baseline);
}
