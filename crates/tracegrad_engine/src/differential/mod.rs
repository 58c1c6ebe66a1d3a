//! User-facing differential operators.
//!
//! Every operator is a thin composition of the same steps: enter a trace
//! scope, seed a root node for the differentiated argument, run the user
//! function, leave the scope, then run the reverse or forward engine over
//! the recorded graph.
//!
//! Operators take a function `Fn(&Var) -> AutodiffResult<Var>` and return a
//! function of the same input signature. Because the returned functions
//! accept tracers, operators compose: `hessian` is literally
//! `jacobian(grad(f))`.
//!
//! # Usage
//!
//! ```rust
//! use tracegrad_engine::{grad, hessian, jacobian, Var};
//!
//! let cube = |x: &Var| x.powf(3.0);
//! let d = grad(cube)(&Var::scalar(2.0)).unwrap();
//! assert_eq!(d.item().unwrap(), 12.0);
//!
//! let f = |x: &Var| x.index(0)?.mul(&x.index(1)?);
//! let h = hessian(f)(&Var::vector(vec![3.0, 4.0])).unwrap();
//! assert_eq!(h.array().data(), &[0.0, 1.0, 1.0, 0.0]);
//! # let _ = jacobian(cube);
//! ```

pub mod tree;

pub use tree::{grad_named, grad_tree, jacobian_tree, multigrad_dict, value_and_grad_tree};

use std::rc::Rc;

use tracegrad_core::Array;

use crate::context::{Level, TraceScope};
use crate::error::{AutodiffError, AutodiffResult};
use crate::forward::forward_pass;
use crate::node::Node;
use crate::numpy::{stack, vdot};
use crate::reverse::backward_pass;
use crate::tracer::{Tracer, Var};

// =============================================================================
// Tracing
// =============================================================================

/// A finished trace of one function evaluation.
struct Trace {
    level: Level,
    root: Rc<Node>,
    /// Output node, or `None` if the output does not depend on the root.
    end: Option<Rc<Node>>,
    /// Output with this trace's wrapper removed.
    value: Var,
}

/// Runs `f` on a fresh root at a new level and records the result.
///
/// The level is popped before this returns, on success or failure.
fn trace<F, A>(f: F, x: &Var) -> AutodiffResult<(Trace, A)>
where
    F: FnOnce(&Var) -> AutodiffResult<(Var, A)>,
{
    let scope = TraceScope::enter();
    let level = scope.level();
    let root = Node::root(x.clone(), level);
    let start = Var::Traced(Tracer::new(Rc::clone(&root)));
    let (out, aux) = f(&start)?;
    drop(scope);

    let end = match &out {
        Var::Traced(tracer) if tracer.level() == level => Some(Rc::clone(tracer.node())),
        _ => {
            tracing::warn!(level = %level, "output does not depend on the input; derivative is zero");
            None
        }
    };
    let value = out.unbox(level);
    Ok((
        Trace {
            level,
            root,
            end,
            value,
        },
        aux,
    ))
}

fn check_scalar(value: &Var) -> AutodiffResult<()> {
    if value.size() != 1 {
        return Err(AutodiffError::NonScalarOutput {
            shape: value.shape().to_vec(),
        });
    }
    Ok(())
}

// =============================================================================
// Reverse mode
// =============================================================================

/// Maps an output cotangent to the input cotangent of a traced function.
pub struct Pullback {
    root: Rc<Node>,
    end: Option<Rc<Node>>,
    output_shape: Vec<usize>,
}

impl Pullback {
    /// Cotangent of the input for output cotangent `g`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `g` does not have the output's shape, plus any
    /// error raised by a derivative rule.
    pub fn call(&self, g: &Var) -> AutodiffResult<Var> {
        let Some(end) = &self.end else {
            if g.shape() != self.output_shape.as_slice() {
                return Err(AutodiffError::ShapeMismatch {
                    primitive: "<output>".to_string(),
                    expected: self.output_shape.clone(),
                    found: g.shape().to_vec(),
                });
            }
            return Ok(self.root.value().zeros_like());
        };
        let grads = backward_pass(end, g.clone(), std::slice::from_ref(&self.root))?;
        Ok(grads
            .into_iter()
            .next()
            .unwrap_or_else(|| self.root.value().zeros_like()))
    }

    /// Shape of the traced function's output.
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }
}

fn pullback_of(trace: Trace) -> (Var, Pullback) {
    let output_shape = trace.value.shape().to_vec();
    (
        trace.value,
        Pullback {
            root: trace.root,
            end: trace.end,
            output_shape,
        },
    )
}

/// Evaluates `f` at `x` and returns its value together with the pullback.
///
/// # Examples
///
/// ```rust
/// use tracegrad_engine::{vjp, Var};
///
/// let (y, pullback) = vjp(|x: &Var| x.mul(&Var::scalar(3.0)), &Var::vector(vec![1.0, 2.0])).unwrap();
/// assert_eq!(y.array().data(), &[3.0, 6.0]);
/// let g = pullback.call(&Var::vector(vec![1.0, 10.0])).unwrap();
/// assert_eq!(g.array().data(), &[3.0, 30.0]);
/// ```
pub fn vjp<F>(f: F, x: &Var) -> AutodiffResult<(Var, Pullback)>
where
    F: FnOnce(&Var) -> AutodiffResult<Var>,
{
    let (trace, ()) = trace(|x| Ok((f(x)?, ())), x)?;
    Ok(pullback_of(trace))
}

/// Gradient of a scalar-valued function.
///
/// The returned function fails with `NonScalarOutput` when `f` produces
/// more than one element.
pub fn grad<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var| value_and_grad_impl(&f, x).map(|(_, g)| g)
}

fn value_and_grad_impl<F>(f: &F, x: &Var) -> AutodiffResult<(Var, Var)>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    let (value, pullback) = vjp(f, x)?;
    check_scalar(&value)?;
    let g = pullback.call(&value.ones_like())?;
    Ok((value, g))
}

/// Value and gradient from a single forward and backward pass.
pub fn value_and_grad<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<(Var, Var)>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var| value_and_grad_impl(&f, x)
}

/// Gradient of the first output of `f`, passing the second through.
///
/// Tracers in the auxiliary output are unwrapped from this trace's level.
pub fn grad_and_aux<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<(Var, Var)>
where
    F: Fn(&Var) -> AutodiffResult<(Var, Var)>,
{
    let value_and_grad = value_and_grad_and_aux(f);
    move |x: &Var| value_and_grad(x).map(|(_, g, aux)| (g, aux))
}

/// Value, gradient and auxiliary output of `f` from one forward and one
/// backward pass.
pub fn value_and_grad_and_aux<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<(Var, Var, Var)>
where
    F: Fn(&Var) -> AutodiffResult<(Var, Var)>,
{
    move |x: &Var| {
        let (trace, aux) = trace(&f, x)?;
        let aux = aux.unbox(trace.level);
        let (value, pullback) = pullback_of(trace);
        check_scalar(&value)?;
        let g = pullback.call(&value.ones_like())?;
        Ok((value, g, aux))
    }
}

/// Sum of the Jacobian's rows for an elementwise function: the pullback of
/// a ones cotangent.
pub fn elementwise_grad<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var| {
        let (value, pullback) = vjp(&f, x)?;
        pullback.call(&value.ones_like())
    }
}

/// Gradient with respect to positional argument `argnum`; the other
/// arguments are held constant.
pub fn grad_argnum<F>(f: F, argnum: usize) -> impl Fn(&[Var]) -> AutodiffResult<Var>
where
    F: Fn(&[Var]) -> AutodiffResult<Var>,
{
    move |args: &[Var]| {
        let x = args.get(argnum).ok_or_else(|| {
            AutodiffError::StructureMismatch(format!(
                "gradient requested for argument {argnum} but only {} supplied",
                args.len()
            ))
        })?;
        let with_x = |x: &Var| {
            let mut replaced = args.to_vec();
            replaced[argnum] = x.clone();
            f(&replaced)
        };
        grad(with_x)(x)
    }
}

/// Full Jacobian with shape `output.shape ++ input.shape`, one reverse pass
/// per output element.
pub fn jacobian<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var| {
        let (value, pullback) = vjp(&f, x)?;
        let mut shape = value.shape().to_vec();
        shape.extend_from_slice(x.shape());
        if value.size() == 0 {
            return Ok(Var::from(Array::zeros(&shape)));
        }
        let rows = (0..value.size())
            .map(|i| pullback.call(&Var::from(Array::basis(value.shape(), i)?)))
            .collect::<AutodiffResult<Vec<_>>>()?;
        stack(&rows)?.reshape(&shape)
    }
}

/// Hessian of a scalar function: the Jacobian of its gradient.
pub fn hessian<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    jacobian(grad(f))
}

/// `H(x) v` by reverse-over-reverse, without building `H`.
pub fn hessian_vector_product<F>(f: F) -> impl Fn(&Var, &Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    hessian_tensor_product(f)
}

/// Contracts the Hessian with `v` over all of `x`'s axes. `v` has the shape
/// of `x` and so does the result.
pub fn hessian_tensor_product<F>(f: F) -> impl Fn(&Var, &Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var, v: &Var| {
        if v.shape() != x.shape() {
            return Err(AutodiffError::ShapeMismatch {
                primitive: "hessian_tensor_product".to_string(),
                expected: x.shape().to_vec(),
                found: v.shape().to_vec(),
            });
        }
        let df = grad(&f);
        let hvp = grad(|x: &Var| vdot(&df(x)?, v))(x);
        hvp
    }
}

/// Gradient of `f` at `x` with a reusable Hessian-vector product.
///
/// The gradient is traced once; each call of the returned [`Pullback`] maps
/// `v` to `H(x) v` without re-running `f`.
pub fn make_hvp<F>(f: F, x: &Var) -> AutodiffResult<(Var, Pullback)>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    vjp(grad(f), x)
}

/// `vᵀ J` for a cotangent `v` of the output's shape.
pub fn tensor_jacobian_product<F>(f: F) -> impl Fn(&Var, &Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var, v: &Var| {
        let (_, pullback) = vjp(&f, x)?;
        pullback.call(v)
    }
}

/// Same as [`tensor_jacobian_product`].
pub fn vector_jacobian_product<F>(f: F) -> impl Fn(&Var, &Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    tensor_jacobian_product(f)
}

// =============================================================================
// Forward mode
// =============================================================================

/// Maps an input tangent to the output tangent of a traced function.
pub struct Pushforward {
    root: Rc<Node>,
    end: Option<Rc<Node>>,
    output: Var,
}

impl Pushforward {
    /// Output tangent for input tangent `v`.
    pub fn call(&self, v: &Var) -> AutodiffResult<Var> {
        match &self.end {
            Some(end) => forward_pass(&self.root, v.clone(), end),
            None => {
                if v.shape() != self.root.value().shape() {
                    return Err(AutodiffError::ShapeMismatch {
                        primitive: "<root>".to_string(),
                        expected: self.root.value().shape().to_vec(),
                        found: v.shape().to_vec(),
                    });
                }
                Ok(self.output.zeros_like())
            }
        }
    }
}

/// Evaluates `f` at `x` and returns its value with a reusable push-forward.
pub fn make_jvp<F>(f: F, x: &Var) -> AutodiffResult<(Var, Pushforward)>
where
    F: FnOnce(&Var) -> AutodiffResult<Var>,
{
    let (trace, ()) = trace(|x| Ok((f(x)?, ())), x)?;
    let pushforward = Pushforward {
        root: trace.root,
        end: trace.end,
        output: trace.value.clone(),
    };
    Ok((trace.value, pushforward))
}

/// Value of `f` at `x` and its directional derivative along `v`.
///
/// # Examples
///
/// ```rust
/// use tracegrad_engine::{jvp, Var};
///
/// let (y, dy) = jvp(|x: &Var| x.sin(), &Var::scalar(0.0), &Var::scalar(2.0)).unwrap();
/// assert_eq!(y.item().unwrap(), 0.0);
/// assert_eq!(dy.item().unwrap(), 2.0);
/// ```
pub fn jvp<F>(f: F, x: &Var, v: &Var) -> AutodiffResult<(Var, Var)>
where
    F: FnOnce(&Var) -> AutodiffResult<Var>,
{
    let (value, pushforward) = make_jvp(f, x)?;
    let tangent = pushforward.call(v)?;
    Ok((value, tangent))
}

/// Derivative of an elementwise function by forward mode with a ones tangent.
pub fn deriv<F>(f: F) -> impl Fn(&Var) -> AutodiffResult<Var>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
{
    move |x: &Var| jvp(&f, x, &x.ones_like()).map(|(_, t)| t)
}

// =============================================================================
// Gauss-Newton
// =============================================================================

/// `0.5 * sum(x^2)`, the usual outer loss for [`make_ggnvp`].
pub fn half_sum_of_squares(x: &Var) -> AutodiffResult<Var> {
    x.square()?.sum()?.mul(&Var::scalar(0.5))
}

/// Generalised Gauss-Newton product `Jᵀ H_g J v` at a fixed point.
pub struct Ggnvp {
    f_vjp: Pullback,
    g_hvp: Pullback,
    f_jvp: Pullback,
}

impl Ggnvp {
    /// Applies the Gauss-Newton matrix to `v`.
    pub fn call(&self, v: &Var) -> AutodiffResult<Var> {
        let jv = self.f_jvp.call(v)?;
        let hjv = self.g_hvp.call(&jv)?;
        self.f_vjp.call(&hjv)
    }
}

/// Builds the Gauss-Newton product of `g ∘ f` at `x`, where `J` is the
/// Jacobian of `f` and `H_g` the Hessian of `g` at `f(x)`.
///
/// `J v` is obtained by differentiating the (linear) pullback of `f`, so
/// only reverse mode is used.
pub fn make_ggnvp<F, G>(f: F, g: G, x: &Var) -> AutodiffResult<Ggnvp>
where
    F: Fn(&Var) -> AutodiffResult<Var>,
    G: Fn(&Var) -> AutodiffResult<Var>,
{
    let (f_x, f_vjp) = vjp(&f, x)?;
    let (grad_g_x, g_hvp) = vjp(grad(&g), &f_x)?;
    let (_, f_jvp) = vjp(|u: &Var| f_vjp.call(u), &grad_g_x.zeros_like())?;
    Ok(Ggnvp {
        f_vjp,
        g_hvp,
        f_jvp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use approx::assert_relative_eq;

    mod reverse_tests {
        use super::*;

        #[test]
        fn test_grad_of_cube() {
            let d = grad(|x: &Var| x.powf(3.0))(&Var::scalar(2.0)).unwrap();
            assert_relative_eq!(d.item().unwrap(), 12.0, epsilon = 1e-12);
        }

        #[test]
        fn test_grad_rejects_vector_output() {
            let err = grad(|x: &Var| x.exp())(&Var::vector(vec![1.0, 2.0])).unwrap_err();
            assert_eq!(err, AutodiffError::NonScalarOutput { shape: vec![2] });
        }

        #[test]
        fn test_independent_output_has_zero_gradient() {
            let g = grad(|_x: &Var| Ok(Var::scalar(5.0)))(&Var::vector(vec![1.0, 2.0])).unwrap();
            assert_eq!(g.array().data(), &[0.0, 0.0]);
        }

        #[test]
        fn test_identity_gradient() {
            let g = grad(|x: &Var| Ok(x.clone()))(&Var::scalar(3.0)).unwrap();
            assert_eq!(g.item().unwrap(), 1.0);
        }

        #[test]
        fn test_value_and_grad_agree_with_parts() {
            let f = |x: &Var| x.sin()?.mul(x);
            let (v, g) = value_and_grad(f)(&Var::scalar(1.2)).unwrap();
            assert_relative_eq!(v.item().unwrap(), 1.2 * 1.2f64.sin());
            assert_relative_eq!(
                g.item().unwrap(),
                grad(f)(&Var::scalar(1.2)).unwrap().item().unwrap()
            );
        }

        #[test]
        fn test_grad_and_aux_unwraps_aux() {
            let f = |x: &Var| -> AutodiffResult<(Var, Var)> { Ok((x.square()?, x.exp()?)) };
            let (g, aux) = grad_and_aux(f)(&Var::scalar(1.0)).unwrap();
            assert_relative_eq!(g.item().unwrap(), 2.0);
            assert!(!aux.is_traced());
            assert_relative_eq!(aux.item().unwrap(), 1f64.exp());
        }

        #[test]
        fn test_value_and_grad_and_aux() {
            let f = |x: &Var| -> AutodiffResult<(Var, Var)> {
                let y = x.sin()?;
                Ok((y.mul(x)?.sum()?, y))
            };
            let x = Var::vector(vec![0.4, -1.1]);
            let (value, g, aux) = value_and_grad_and_aux(f)(&x).unwrap();
            let (expected_value, expected_g) = value_and_grad(|x: &Var| x.sin()?.mul(x)?.sum())(&x).unwrap();
            assert_eq!(value, expected_value);
            assert_eq!(g, expected_g);
            assert!(!aux.is_traced());
            assert_eq!(aux, x.sin().unwrap());

            let err = value_and_grad_and_aux(|x: &Var| Ok((x.clone(), x.clone())))(&x).unwrap_err();
            assert_eq!(err, AutodiffError::NonScalarOutput { shape: vec![2] });
        }

        #[test]
        fn test_grad_argnum_holds_others_constant() {
            let f = |args: &[Var]| args[0].mul(&args[1])?.sum();
            let args = [Var::vector(vec![1.0, 2.0]), Var::vector(vec![3.0, 4.0])];
            let g1 = grad_argnum(f, 1)(&args).unwrap();
            assert_eq!(g1.array().data(), &[1.0, 2.0]);
            assert!(matches!(
                grad_argnum(f, 2)(&args),
                Err(AutodiffError::StructureMismatch(_))
            ));
        }

        #[test]
        fn test_elementwise_grad() {
            let g = elementwise_grad(|x: &Var| x.square())(&Var::vector(vec![1.0, -2.0])).unwrap();
            assert_eq!(g.array().data(), &[2.0, -4.0]);
        }

        #[test]
        fn test_scope_released_after_user_error() {
            let before = context::depth();
            let result = grad(|x: &Var| x.slice(0, 10)?.sum())(&Var::vector(vec![1.0]));
            assert!(result.is_err());
            assert_eq!(context::depth(), before);
        }
    }

    mod jacobian_tests {
        use super::*;

        #[test]
        fn test_jacobian_scenario() {
            let f = |x: &Var| {
                let (a, b) = (x.index(0)?, x.index(1)?);
                stack(&[a.mul(&b)?, a.add(&b)?])
            };
            let j = jacobian(f)(&Var::vector(vec![3.0, 4.0])).unwrap();
            assert_eq!(j.shape(), &[2, 2]);
            assert_eq!(j.array().data(), &[4.0, 3.0, 1.0, 1.0]);
        }

        #[test]
        fn test_jacobian_shape_concatenates_shapes() {
            let m = Var::from_vec(vec![1.0; 6], vec![3, 2]).unwrap();
            let j = jacobian(|x: &Var| m.dot(x))(&Var::vector(vec![1.0, 2.0])).unwrap();
            assert_eq!(j.shape(), &[3, 2]);
        }

        #[test]
        fn test_hessian_of_quadratic_form() {
            let a = Var::from_vec(vec![2.0, 1.0, 1.0, 3.0], vec![2, 2]).unwrap();
            let f = |x: &Var| vdot(x, &a.dot(x)?);
            let h = hessian(f)(&Var::vector(vec![0.3, -0.7])).unwrap();
            // H = A + A^T
            let expected = [4.0, 2.0, 2.0, 6.0];
            for (got, want) in h.array().data().iter().zip(expected) {
                assert_relative_eq!(*got, want, epsilon = 1e-12);
            }
        }

        #[test]
        fn test_hessian_vector_product() {
            let f = |x: &Var| x.powf(3.0)?.sum();
            let x = Var::vector(vec![1.0, 2.0]);
            let v = Var::vector(vec![1.0, 1.0]);
            let hv = hessian_vector_product(f)(&x, &v).unwrap();
            // H = diag(6x)
            assert_relative_eq!(hv.array().data()[0], 6.0, epsilon = 1e-12);
            assert_relative_eq!(hv.array().data()[1], 12.0, epsilon = 1e-12);
        }

        #[test]
        fn test_hessian_tensor_product_over_matrix_input() {
            // f = sum(x^3) over a 2x2 input, H = diag(6x) in raveled order
            let f = |x: &Var| x.powf(3.0)?.sum();
            let x = Var::from_vec(vec![1.0, 2.0, -1.0, 0.5], vec![2, 2]).unwrap();
            let v = Var::from_vec(vec![1.0, 0.0, 2.0, -1.0], vec![2, 2]).unwrap();
            let hv = hessian_tensor_product(f)(&x, &v).unwrap();
            assert_eq!(hv.shape(), &[2, 2]);
            let expected = [6.0, 0.0, -12.0, -3.0];
            for (got, want) in hv.array().data().iter().zip(expected) {
                assert_relative_eq!(*got, want, epsilon = 1e-12);
            }

            let err = hessian_tensor_product(f)(&x, &Var::vector(vec![1.0; 4])).unwrap_err();
            assert!(matches!(err, AutodiffError::ShapeMismatch { .. }));
        }

        #[test]
        fn test_make_hvp_is_reusable() {
            let a = Var::from_vec(vec![2.0, 1.0, 1.0, 3.0], vec![2, 2]).unwrap();
            let f = |x: &Var| x.exp()?.sum()?.add(&vdot(x, &a.dot(x)?)?);
            let x = Var::vector(vec![0.2, -0.4]);
            let (g, hvp) = make_hvp(f, &x).unwrap();
            assert_eq!(g, grad(f)(&x).unwrap());

            for v in [vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, -2.0]] {
                let v = Var::vector(v);
                let reused = hvp.call(&v).unwrap();
                let direct = hessian_vector_product(f)(&x, &v).unwrap();
                for (a, b) in reused.array().data().iter().zip(direct.array().data()) {
                    assert_relative_eq!(a, b, epsilon = 1e-12);
                }
            }
        }

        #[test]
        fn test_vector_jacobian_product() {
            let f = |x: &Var| x.square();
            let vjp_v = vector_jacobian_product(f)(&Var::vector(vec![1.0, 2.0]), &Var::vector(vec![1.0, 0.5]))
                .unwrap();
            assert_eq!(vjp_v.array().data(), &[2.0, 2.0]);
        }
    }

    mod forward_tests {
        use super::*;

        #[test]
        fn test_jvp_matches_reverse() {
            let f = |x: &Var| x.exp()?.mul(&x.sin()?)?.sum();
            let x = Var::vector(vec![0.1, 0.2, 0.3]);
            let v = Var::vector(vec![1.0, -1.0, 0.5]);
            let (_, t) = jvp(f, &x, &v).unwrap();
            let g = grad(f)(&x).unwrap();
            let expected = vdot(&g, &v).unwrap().item().unwrap();
            assert_relative_eq!(t.item().unwrap(), expected, epsilon = 1e-12);
        }

        #[test]
        fn test_make_jvp_is_reusable() {
            let (y, push) = make_jvp(|x: &Var| x.mul(&Var::scalar(4.0)), &Var::scalar(1.0)).unwrap();
            assert_eq!(y.item().unwrap(), 4.0);
            assert_eq!(push.call(&Var::scalar(1.0)).unwrap().item().unwrap(), 4.0);
            assert_eq!(push.call(&Var::scalar(0.5)).unwrap().item().unwrap(), 2.0);
        }

        #[test]
        fn test_forward_over_reverse_hvp() {
            let f = |x: &Var| x.index(0)?.square()?.mul(&x.index(1)?);
            let x = Var::vector(vec![1.5, -2.0]);
            let v = Var::vector(vec![0.3, 0.7]);
            let (_, hv) = jvp(grad(f), &x, &v).unwrap();
            let reference = hessian_vector_product(f)(&x, &v).unwrap();
            for (a, b) in hv.array().data().iter().zip(reference.array().data()) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    mod ggn_tests {
        use super::*;

        #[test]
        fn test_ggnvp_of_linear_map_is_jtj() {
            let m = Var::from_vec(vec![1.0, 2.0, 0.0, 1.0, 3.0, -1.0], vec![3, 2]).unwrap();
            let f = |x: &Var| m.dot(x);
            let ggn = make_ggnvp(f, half_sum_of_squares, &Var::vector(vec![0.5, 0.5])).unwrap();
            let out = ggn.call(&Var::vector(vec![1.0, 0.0])).unwrap();
            // M^T M e1 = [1+0+9, 2+0-3]
            assert_relative_eq!(out.array().data()[0], 10.0, epsilon = 1e-12);
            assert_relative_eq!(out.array().data()[1], -1.0, epsilon = 1e-12);
        }
    }
}
