//! Verification of engine derivatives against independent references.
//!
//! - Dual numbers (`num_dual::Dual64`) as a forward-mode oracle
//! - Central finite differences through `gradcheck`
//! - Checkpointed functions against their unwrapped form

use approx::assert_relative_eq;
use num_dual::{Dual64, DualNum};
use tracegrad_engine::checkpoint::checkpoint;
use tracegrad_engine::gradcheck::{check_grads, CheckMode, GradCheckConfig, GradCheckModes};
use tracegrad_engine::{
    grad, half_sum_of_squares, hessian, jacobian, jvp, make_ggnvp, AutodiffResult, Var,
};

fn engine_f(x: &Var) -> AutodiffResult<Var> {
    // f(x) = exp(sin(x)) * sqrt(x) + x^3 / (1 + tanh(x))
    let one = Var::scalar(1.0);
    x.sin()?
        .exp()?
        .mul(&x.sqrt()?)?
        .add(&x.powf(3.0)?.div(&one.add(&x.tanh()?)?)?)
}

fn dual_f(x: Dual64) -> Dual64 {
    x.sin().exp() * x.sqrt() + x.powi(3) / (x.tanh() + 1.0)
}

fn engine_g(x: &Var) -> AutodiffResult<Var> {
    // g(a, b) = log(a^2 + b^2) * cos(a b)
    let a = x.index(0)?;
    let b = x.index(1)?;
    a.square()?.add(&b.square()?)?.log()?.mul(&a.mul(&b)?.cos()?)
}

fn dual_g(a: Dual64, b: Dual64) -> Dual64 {
    (a * a + b * b).ln() * (a * b).cos()
}

// =============================================================================
// Dual-number oracle
// =============================================================================

/// Test reverse and forward derivatives of a scalar function against Dual64.
#[test]
fn test_scalar_derivative_matches_dual() {
    for x0 in [0.2, 0.8, 1.3, 2.9] {
        let oracle = dual_f(Dual64::new(x0, 1.0));

        let g = grad(engine_f)(&Var::scalar(x0)).unwrap();
        assert_relative_eq!(g.item().unwrap(), oracle.eps, epsilon = 1e-12, max_relative = 1e-12);

        let (value, tangent) = jvp(engine_f, &Var::scalar(x0), &Var::scalar(1.0)).unwrap();
        assert_relative_eq!(value.item().unwrap(), oracle.re, epsilon = 1e-12);
        assert_relative_eq!(tangent.item().unwrap(), oracle.eps, epsilon = 1e-12, max_relative = 1e-12);
    }
}

/// Test each gradient component against a Dual64 seeded along that axis.
#[test]
fn test_gradient_components_match_dual() {
    let (a, b) = (0.7, -1.2);
    let g = grad(engine_g)(&Var::vector(vec![a, b])).unwrap();

    let da = dual_g(Dual64::new(a, 1.0), Dual64::new(b, 0.0));
    let db = dual_g(Dual64::new(a, 0.0), Dual64::new(b, 1.0));
    assert_relative_eq!(g.array().data()[0], da.eps, epsilon = 1e-12);
    assert_relative_eq!(g.array().data()[1], db.eps, epsilon = 1e-12);
}

/// Test a directional derivative against a Dual64 with a mixed seed.
#[test]
fn test_directional_derivative_matches_dual() {
    let (a, b) = (0.7, -1.2);
    let (va, vb) = (0.3, 2.0);
    let (_, tangent) = jvp(engine_g, &Var::vector(vec![a, b]), &Var::vector(vec![va, vb])).unwrap();
    let oracle = dual_g(Dual64::new(a, va), Dual64::new(b, vb));
    assert_relative_eq!(tangent.item().unwrap(), oracle.eps, epsilon = 1e-12);
}

/// Test Hessian rows against Dual64 applied to the gradient.
#[test]
fn test_hessian_rows_match_dual_of_gradient() {
    // gradient of g written out by hand in dual arithmetic
    fn dual_grad_g(a: Dual64, b: Dual64) -> [Dual64; 2] {
        let r = a * a + b * b;
        let c = (a * b).cos();
        let s = (a * b).sin();
        [
            a * 2.0 / r * c - r.ln() * s * b,
            b * 2.0 / r * c - r.ln() * s * a,
        ]
    }
    let (a, b) = (0.7, -1.2);
    let h = hessian(engine_g)(&Var::vector(vec![a, b])).unwrap();
    let col_a = dual_grad_g(Dual64::new(a, 1.0), Dual64::new(b, 0.0));
    let col_b = dual_grad_g(Dual64::new(a, 0.0), Dual64::new(b, 1.0));
    let data = h.array().data();
    assert_relative_eq!(data[0], col_a[0].eps, epsilon = 1e-10);
    assert_relative_eq!(data[1], col_b[0].eps, epsilon = 1e-10);
    assert_relative_eq!(data[2], col_a[1].eps, epsilon = 1e-10);
    assert_relative_eq!(data[3], col_b[1].eps, epsilon = 1e-10);
}

// =============================================================================
// Finite differences
// =============================================================================

/// Test gradcheck passes on correct rules up to second order.
#[test]
fn test_gradcheck_second_order() {
    let config = GradCheckConfig::builder().order(2).seed(11).build().unwrap();
    let report = check_grads(engine_g, &Var::vector(vec![0.7, -1.2]), &config).unwrap();
    assert!(report.all_passed(), "{:?}", report.first_failure());
    assert!(report.checks().iter().any(|c| c.mode == CheckMode::Forward));
    assert!(report.checks().iter().any(|c| c.mode == CheckMode::Reverse));
}

/// Test gradcheck over shape and reduction primitives.
#[test]
fn test_gradcheck_shape_ops() {
    let f = |x: &Var| {
        let m = x.reshape(&[2, 3])?;
        let t = m.transpose()?;
        t.dot(&m)?.logsumexp()
    };
    let x = Var::vector(vec![0.1, -0.2, 0.3, 0.4, -0.5, 0.6]);
    let report = check_grads(f, &x, &GradCheckConfig::default()).unwrap();
    assert!(report.all_passed(), "{:?}", report.first_failure());
}

/// Test gradcheck detects a wrong derivative rule.
#[test]
fn test_gradcheck_detects_wrong_rule() {
    use std::sync::Arc;
    use tracegrad_engine::registry::{self, JvpFn, VjpFn, VjpMaker};
    use tracegrad_engine::{Attrs, Primitive};

    // cube with a rule that is off by a factor of two
    let cube = Primitive::new("bad_cube", |args, _| Ok(args[0].map(|x| x * x * x)));
    let maker: VjpMaker = Arc::new(|_ans: &Var, args: &[Var], _: &Attrs| {
        let x = args[0].clone();
        let rule: VjpFn = Box::new(move |g: &Var| g.mul(&x.square()?)?.mul(&Var::scalar(6.0)));
        Ok(rule)
    });
    registry::defvjp(&cube, vec![Some(maker)]);
    let tangent: JvpFn = Arc::new(|g: &Var, _ans: &Var, args: &[Var], _: &Attrs| {
        g.mul(&args[0].square()?)?.mul(&Var::scalar(3.0))
    });
    registry::defjvp(&cube, vec![Some(tangent)]);

    let config = GradCheckConfig::builder()
        .modes(GradCheckModes::Both)
        .build()
        .unwrap();
    let report = check_grads(
        move |x: &Var| cube.call(&[x.clone()], &Attrs::new()),
        &Var::scalar(1.3),
        &config,
    )
    .unwrap();
    assert!(!report.all_passed());
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.mode, CheckMode::Reverse);
}

// =============================================================================
// Checkpointing and Gauss-Newton
// =============================================================================

/// Test checkpointed blocks give the same Jacobian as the direct form.
#[test]
fn test_checkpoint_jacobian() {
    let block = |x: &Var| x.sin()?.mul(&x.exp()?);
    let saved = checkpoint(block);
    let x = Var::vector(vec![0.1, 0.2, 0.3]);

    let direct = jacobian(block)(&x).unwrap();
    let wrapped = jacobian(move |x: &Var| saved.call(x))(&x).unwrap();
    assert_eq!(direct.shape(), wrapped.shape());
    for (a, b) in direct.array().data().iter().zip(wrapped.array().data()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-14);
    }
}

/// Test the Gauss-Newton product of a linear map equals JᵀJv.
#[test]
fn test_ggnvp_of_linear_map() {
    let a = Var::from_vec(vec![1.0, 2.0, 0.0, -1.0, 3.0, 1.0], vec![3, 2]).unwrap();
    let a_inner = a.clone();
    let f = move |x: &Var| a_inner.dot(x);
    let x = Var::vector(vec![0.5, -0.5]);
    let v = Var::vector(vec![1.0, 2.0]);

    let ggnvp = make_ggnvp(f, half_sum_of_squares, &x).unwrap();
    let got = ggnvp.call(&v).unwrap();
    let expected = a.transpose().unwrap().dot(&a.dot(&v).unwrap()).unwrap();
    for (g, e) in got.array().data().iter().zip(expected.array().data()) {
        assert_relative_eq!(*g, *e, epsilon = 1e-12);
    }
}
