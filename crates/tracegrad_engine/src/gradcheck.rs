//! Finite-difference verification of derivatives.
//!
//! [`check_grads`] compares automatic derivatives against central finite
//! differences along random directions:
//!
//! - Forward: `jvp(v) ≈ (f(x + εv) − f(x − εv)) / 2ε`
//! - Reverse: `⟨vjp(u), v⟩ ≈ ⟨u, (f(x + εv) − f(x − εv)) / 2ε⟩`
//!
//! With `order > 1` the same checks are repeated on the derivative maps
//! `x -> vjp(f, x)(u)` and `x -> jvp(f, x)(v)`.
//!
//! # Usage
//!
//! ```rust
//! use tracegrad_engine::gradcheck::{check_grads, GradCheckConfig};
//! use tracegrad_engine::Var;
//!
//! let config = GradCheckConfig::builder().order(2).seed(7).build().unwrap();
//! let report = check_grads(|x: &Var| x.sin()?.mul(x), &Var::vector(vec![0.3, 1.1]), &config).unwrap();
//! assert!(report.all_passed());
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;
use tracegrad_core::Array;

use crate::differential::{jvp, vjp};
use crate::error::AutodiffResult;
use crate::numpy::vdot;
use crate::tracer::Var;

/// Invalid gradient-check configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradCheckConfigError {
    /// Finite-difference step must be positive and finite.
    #[error("Finite-difference step must be positive and finite, got {0}")]
    InvalidStep(f64),

    /// Tolerances must be non-negative and finite.
    #[error("Tolerance '{name}' must be non-negative and finite, got {value}")]
    InvalidTolerance {
        /// Field name
        name: &'static str,
        /// Supplied value
        value: f64,
    },

    /// Derivative order must be at least one.
    #[error("Derivative order must be at least 1, got {0}")]
    InvalidOrder(usize),
}

/// Which automatic-differentiation modes to check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradCheckModes {
    /// Forward mode only.
    Forward,
    /// Reverse mode only.
    Reverse,
    /// Both modes.
    #[default]
    Both,
}

impl GradCheckModes {
    fn forward(self) -> bool {
        matches!(self, GradCheckModes::Forward | GradCheckModes::Both)
    }

    fn reverse(self) -> bool {
        matches!(self, GradCheckModes::Reverse | GradCheckModes::Both)
    }
}

/// Gradient-check configuration.
///
/// Use [`GradCheckConfig::builder`] to construct validated instances.
#[derive(Clone, Debug, PartialEq)]
pub struct GradCheckConfig {
    eps: f64,
    rtol: f64,
    atol: f64,
    modes: GradCheckModes,
    order: usize,
    seed: u64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            rtol: 1e-5,
            atol: 1e-6,
            modes: GradCheckModes::Both,
            order: 1,
            seed: 42,
        }
    }
}

impl GradCheckConfig {
    /// Creates a builder starting from the defaults.
    #[inline]
    pub fn builder() -> GradCheckConfigBuilder {
        GradCheckConfigBuilder::default()
    }

    /// Finite-difference step.
    #[inline]
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Relative tolerance.
    #[inline]
    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    /// Absolute tolerance.
    #[inline]
    pub fn atol(&self) -> f64 {
        self.atol
    }

    /// Modes checked.
    #[inline]
    pub fn modes(&self) -> GradCheckModes {
        self.modes
    }

    /// Highest derivative order checked.
    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Seed for the random directions.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - `InvalidStep` if `eps` is not positive and finite
    /// - `InvalidTolerance` if `rtol` or `atol` is negative or not finite
    /// - `InvalidOrder` if `order` is 0
    pub fn validate(&self) -> Result<(), GradCheckConfigError> {
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(GradCheckConfigError::InvalidStep(self.eps));
        }
        for (name, value) in [("rtol", self.rtol), ("atol", self.atol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(GradCheckConfigError::InvalidTolerance { name, value });
            }
        }
        if self.order == 0 {
            return Err(GradCheckConfigError::InvalidOrder(self.order));
        }
        Ok(())
    }
}

/// Builder for [`GradCheckConfig`].
#[derive(Clone, Debug, Default)]
pub struct GradCheckConfigBuilder {
    config: GradCheckConfig,
}

impl GradCheckConfigBuilder {
    /// Sets the finite-difference step.
    #[inline]
    pub fn eps(mut self, eps: f64) -> Self {
        self.config.eps = eps;
        self
    }

    /// Sets the relative tolerance.
    #[inline]
    pub fn rtol(mut self, rtol: f64) -> Self {
        self.config.rtol = rtol;
        self
    }

    /// Sets the absolute tolerance.
    #[inline]
    pub fn atol(mut self, atol: f64) -> Self {
        self.config.atol = atol;
        self
    }

    /// Sets which modes are checked.
    #[inline]
    pub fn modes(mut self, modes: GradCheckModes) -> Self {
        self.config.modes = modes;
        self
    }

    /// Sets the highest derivative order.
    #[inline]
    pub fn order(mut self, order: usize) -> Self {
        self.config.order = order;
        self
    }

    /// Sets the random seed.
    #[inline]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<GradCheckConfig, GradCheckConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Mode of one directional check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckMode {
    /// Tangent propagation.
    Forward,
    /// Cotangent propagation.
    Reverse,
}

/// Result of one directional comparison.
#[derive(Clone, Debug)]
pub struct DirectionalCheck {
    /// Mode checked.
    pub mode: CheckMode,
    /// Derivative order, starting at 1.
    pub order: usize,
    /// Automatic derivative along the direction.
    pub analytic: Array,
    /// Central-difference estimate.
    pub numeric: Array,
    /// Largest elementwise absolute difference.
    pub max_abs_error: f64,
    /// Whether every element satisfied `|a - n| <= atol + rtol * |n|`.
    pub passed: bool,
}

/// All checks performed by [`check_grads`].
#[derive(Clone, Debug, Default)]
pub struct GradCheckReport {
    checks: Vec<DirectionalCheck>,
}

impl GradCheckReport {
    /// Individual comparisons in the order they ran.
    pub fn checks(&self) -> &[DirectionalCheck] {
        &self.checks
    }

    /// Whether every comparison passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    /// The first failing comparison, if any.
    pub fn first_failure(&self) -> Option<&DirectionalCheck> {
        self.checks.iter().find(|check| !check.passed)
    }
}

// =============================================================================
// Checking
// =============================================================================

fn random_like(shape: &[usize], rng: &mut StdRng) -> AutodiffResult<Var> {
    let size = tracegrad_core::array::shape_size(shape);
    let data: Vec<f64> = (0..size).map(|_| StandardNormal.sample(rng)).collect();
    Var::from_vec(data, shape.to_vec())
}

fn compare(
    mode: CheckMode,
    order: usize,
    analytic: &Var,
    numeric: &Var,
    config: &GradCheckConfig,
) -> DirectionalCheck {
    let (a, n) = (analytic.to_array(), numeric.to_array());
    let shapes_match = a.shape() == n.shape();
    let mut max_abs_error: f64 = 0.0;
    let mut passed = shapes_match;
    for (x, y) in a.data().iter().zip(n.data()) {
        let err = (x - y).abs();
        max_abs_error = max_abs_error.max(err);
        passed &= err <= config.atol + config.rtol * y.abs();
    }
    if !shapes_match {
        max_abs_error = f64::INFINITY;
    }
    DirectionalCheck {
        mode,
        order,
        analytic: a,
        numeric: n,
        max_abs_error,
        passed,
    }
}

fn check_at(
    f: &dyn Fn(&Var) -> AutodiffResult<Var>,
    x: &Var,
    config: &GradCheckConfig,
    order: usize,
    rng: &mut StdRng,
    report: &mut GradCheckReport,
) -> AutodiffResult<()> {
    let v = random_like(x.shape(), rng)?;
    let step = v.mul(&Var::scalar(config.eps))?;
    let numeric = f(&x.add(&step)?)?
        .sub(&f(&x.sub(&step)?)?)?
        .div(&Var::scalar(2.0 * config.eps))?;

    let (value, pullback) = vjp(f, x)?;
    let u = random_like(value.shape(), rng)?;

    if config.modes.forward() {
        let (_, tangent) = jvp(f, x, &v)?;
        report
            .checks
            .push(compare(CheckMode::Forward, order, &tangent, &numeric, config));
    }
    if config.modes.reverse() {
        let cotangent = pullback.call(&u)?;
        let analytic = vdot(&cotangent, &v)?;
        let estimate = vdot(&u, &numeric)?;
        report
            .checks
            .push(compare(CheckMode::Reverse, order, &analytic, &estimate, config));
    }

    if order < config.order {
        if config.modes.reverse() {
            let vjp_map = |x: &Var| -> AutodiffResult<Var> {
                let (_, pullback) = vjp(f, x)?;
                pullback.call(&u)
            };
            check_at(&vjp_map, x, config, order + 1, rng, report)?;
        }
        if config.modes.forward() {
            let jvp_map = |x: &Var| jvp(f, x, &v).map(|(_, tangent)| tangent);
            check_at(&jvp_map, x, config, order + 1, rng, report)?;
        }
    }
    Ok(())
}

/// Checks derivatives of `f` at `x` up to `config.order()`.
///
/// Errors raised while evaluating or differentiating `f` are returned;
/// numeric disagreement is reported through [`GradCheckReport`].
pub fn check_grads<F>(f: F, x: &Var, config: &GradCheckConfig) -> AutodiffResult<GradCheckReport>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut report = GradCheckReport::default();
    check_at(&f, x, config, 1, &mut rng, &mut report)?;
    tracing::debug!(
        checks = report.checks.len(),
        passed = report.all_passed(),
        "gradient check complete"
    );
    Ok(report)
}
