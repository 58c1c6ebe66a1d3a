//! Derivative rules for the built-in primitives.
//!
//! Installed into the global registry the first time it is touched. Every
//! rule below is composed of traced operations, so the rules can themselves
//! be differentiated.
//!
//! Binary elementwise primitives broadcast 0-d operands only; the reverse
//! rules undo that with [`unbroadcast`] and the forward rules redo it with
//! [`broadcast_to`].

use std::sync::Arc;

use tracegrad_core::Attrs;

use super::*;
use crate::error::AutodiffResult;
use crate::primitive::arg;
use crate::registry::{JvpArgnumFn, JvpFn, Registry, VjpArgnumMaker, VjpFn, VjpMaker};
use crate::tracer::Var;

/// Wraps `rule(g, ans, args, attrs)` as a VJP maker.
fn vjp<F>(rule: F) -> Option<VjpMaker>
where
    F: Fn(&Var, &Var, &[Var], &Attrs) -> AutodiffResult<Var> + Send + Sync + 'static,
{
    let rule = Arc::new(rule);
    let maker: VjpMaker = Arc::new(move |ans: &Var, args: &[Var], attrs: &Attrs| {
        let rule = Arc::clone(&rule);
        let (ans, args, attrs) = (ans.clone(), args.to_vec(), attrs.clone());
        let pullback: VjpFn = Box::new(move |g: &Var| rule(g, &ans, &args, &attrs));
        Ok(pullback)
    });
    Some(maker)
}

/// Argnum-generic form of [`vjp`]: `rule(argnum, g, ans, args, attrs)`.
fn vjp_argnum<F>(rule: F) -> VjpArgnumMaker
where
    F: Fn(usize, &Var, &Var, &[Var], &Attrs) -> AutodiffResult<Var> + Send + Sync + 'static,
{
    let rule = Arc::new(rule);
    Arc::new(
        move |argnum: usize, ans: &Var, args: &[Var], attrs: &Attrs| {
            let rule = Arc::clone(&rule);
            let (ans, args, attrs) = (ans.clone(), args.to_vec(), attrs.clone());
            let pullback: VjpFn = Box::new(move |g: &Var| rule(argnum, g, &ans, &args, &attrs));
            Ok(pullback)
        },
    )
}

fn jvp<F>(rule: F) -> Option<JvpFn>
where
    F: Fn(&Var, &Var, &[Var], &Attrs) -> AutodiffResult<Var> + Send + Sync + 'static,
{
    let rule: JvpFn = Arc::new(rule);
    Some(rule)
}

/// Elementwise `a` where `cond` is nonzero, else `b`. The mask is a constant.
fn select_nonzero(cond: &Var, a: &Var, b: &Var) -> AutodiffResult<Var> {
    let mask = Var::from(cond.array().map(|v| if v != 0.0 { 1.0 } else { 0.0 }));
    let inverse = Var::scalar(1.0).sub(&mask)?;
    a.mul(&mask)?.add(&b.mul(&inverse)?)
}

/// `x` with its exact zeros replaced by `value`.
fn replace_zero(x: &Var, value: f64) -> AutodiffResult<Var> {
    select_nonzero(x, x, &Var::scalar(value))
}

/// Sums a cotangent back down to a 0-d operand that was broadcast.
pub(crate) fn unbroadcast(g: &Var, target: &Var) -> AutodiffResult<Var> {
    if target.ndim() == 0 && g.ndim() > 0 {
        g.sum()
    } else {
        Ok(g.clone())
    }
}

/// Broadcasts a tangent of a 0-d operand up to the output shape.
pub(crate) fn broadcast_to(g: &Var, ans: &Var) -> AutodiffResult<Var> {
    if g.shape() == ans.shape() {
        Ok(g.clone())
    } else {
        g.repeat(ans.shape(), None)
    }
}

/// Installs every built-in rule into `registry`.
pub(crate) fn install(registry: &Registry) {
    install_unary(registry);
    install_binary(registry);
    install_dot(registry);
    install_reductions(registry);
    install_shape_ops(registry);
    install_joins(registry);
    tracing::debug!(primitives = registry.len(), "installed built-in derivative rules");
}

// =============================================================================
// Unary elementwise
// =============================================================================

fn install_unary(registry: &Registry) {
    registry.defvjp(&NEG, vec![vjp(|g, _, _, _| g.neg())]);
    registry.def_linear(&NEG);

    registry.defvjp(&EXP, vec![vjp(|g, ans, _, _| g.mul(ans))]);
    registry.defjvp(&EXP, vec![jvp(|g, ans, _, _| g.mul(ans))]);

    registry.defvjp(&LOG, vec![vjp(|g, _, args, _| g.div(arg("log", args, 0)?))]);
    registry.defjvp(&LOG, vec![jvp(|g, _, args, _| g.div(arg("log", args, 0)?))]);

    registry.defvjp(
        &SIN,
        vec![vjp(|g, _, args, _| g.mul(&arg("sin", args, 0)?.cos()?))],
    );
    registry.defjvp(
        &SIN,
        vec![jvp(|g, _, args, _| g.mul(&arg("sin", args, 0)?.cos()?))],
    );

    registry.defvjp(
        &COS,
        vec![vjp(|g, _, args, _| g.mul(&arg("cos", args, 0)?.sin()?)?.neg())],
    );
    registry.defjvp(
        &COS,
        vec![jvp(|g, _, args, _| g.mul(&arg("cos", args, 0)?.sin()?)?.neg())],
    );

    // d tanh = 1 - tanh^2
    let tanh_rule = |g: &Var, ans: &Var| g.mul(&Var::scalar(1.0).sub(&ans.square()?)?);
    registry.defvjp(&TANH, vec![vjp(move |g, ans, _, _| tanh_rule(g, ans))]);
    registry.defjvp(&TANH, vec![jvp(move |g, ans, _, _| tanh_rule(g, ans))]);

    let sqrt_rule = |g: &Var, ans: &Var| g.div(&ans.mul(&Var::scalar(2.0))?);
    registry.defvjp(&SQRT, vec![vjp(move |g, ans, _, _| sqrt_rule(g, ans))]);
    registry.defjvp(&SQRT, vec![jvp(move |g, ans, _, _| sqrt_rule(g, ans))]);

    registry.defvjp(
        &ABS,
        vec![vjp(|g, _, args, _| g.mul(&arg("absolute", args, 0)?.sign()?))],
    );
    registry.defjvp(
        &ABS,
        vec![jvp(|g, _, args, _| g.mul(&arg("absolute", args, 0)?.sign()?))],
    );

    // piecewise constant
    registry.defvjp(
        &SIGN,
        vec![vjp(|_, _, args, _| Ok(arg("sign", args, 0)?.zeros_like()))],
    );
    registry.defjvp(&SIGN, vec![jvp(|_, ans, _, _| Ok(ans.zeros_like()))]);
}

// =============================================================================
// Binary elementwise
// =============================================================================

fn install_binary(registry: &Registry) {
    registry.defvjp(
        &ADD,
        vec![
            vjp(|g, _, args, _| unbroadcast(g, arg("add", args, 0)?)),
            vjp(|g, _, args, _| unbroadcast(g, arg("add", args, 1)?)),
        ],
    );
    registry.defjvp(
        &ADD,
        vec![
            jvp(|g, ans, _, _| broadcast_to(g, ans)),
            jvp(|g, ans, _, _| broadcast_to(g, ans)),
        ],
    );

    registry.defvjp(
        &SUB,
        vec![
            vjp(|g, _, args, _| unbroadcast(g, arg("subtract", args, 0)?)),
            vjp(|g, _, args, _| unbroadcast(&g.neg()?, arg("subtract", args, 1)?)),
        ],
    );
    registry.defjvp(
        &SUB,
        vec![
            jvp(|g, ans, _, _| broadcast_to(g, ans)),
            jvp(|g, ans, _, _| broadcast_to(&g.neg()?, ans)),
        ],
    );

    registry.defvjp(
        &MUL,
        vec![
            vjp(|g, _, args, _| {
                let (a, b) = (arg("multiply", args, 0)?, arg("multiply", args, 1)?);
                unbroadcast(&g.mul(b)?, a)
            }),
            vjp(|g, _, args, _| {
                let (a, b) = (arg("multiply", args, 0)?, arg("multiply", args, 1)?);
                unbroadcast(&g.mul(a)?, b)
            }),
        ],
    );
    registry.defjvp(
        &MUL,
        vec![
            jvp(|g, ans, args, _| broadcast_to(&g.mul(arg("multiply", args, 1)?)?, ans)),
            jvp(|g, ans, args, _| broadcast_to(&arg("multiply", args, 0)?.mul(g)?, ans)),
        ],
    );

    registry.defvjp(
        &DIV,
        vec![
            vjp(|g, _, args, _| {
                let (a, b) = (arg("divide", args, 0)?, arg("divide", args, 1)?);
                unbroadcast(&g.div(b)?, a)
            }),
            vjp(|g, _, args, _| {
                let (a, b) = (arg("divide", args, 0)?, arg("divide", args, 1)?);
                // -g * a / b^2
                unbroadcast(&g.mul(a)?.div(&b.square()?)?.neg()?, b)
            }),
        ],
    );
    registry.defjvp(
        &DIV,
        vec![
            jvp(|g, ans, args, _| broadcast_to(&g.div(arg("divide", args, 1)?)?, ans)),
            jvp(|g, ans, args, _| {
                let b = arg("divide", args, 1)?;
                broadcast_to(&g.mul(ans)?.div(b)?.neg()?, ans)
            }),
        ],
    );

    // d/dx x^y = y x^(y-1); d/dy x^y = ln(x) x^y
    // A zero exponent keeps x^0 in the base rule and a zero base reads ln(1),
    // so 0^y stays finite where the true derivative is zero.
    let power_base = |g: &Var, args: &[Var]| -> AutodiffResult<Var> {
        let (x, y) = (arg("power", args, 0)?, arg("power", args, 1)?);
        let one = Var::scalar(1.0);
        g.mul(y)?.mul(&x.power(&select_nonzero(y, &y.sub(&one)?, &one)?)?)
    };
    let power_exponent = |g: &Var, ans: &Var, args: &[Var]| -> AutodiffResult<Var> {
        g.mul(&replace_zero(arg("power", args, 0)?, 1.0)?.log()?)?.mul(ans)
    };
    registry.defvjp(
        &POWER,
        vec![
            vjp(move |g, _, args, _| unbroadcast(&power_base(g, args)?, arg("power", args, 0)?)),
            vjp(move |g, ans, args, _| {
                unbroadcast(&power_exponent(g, ans, args)?, arg("power", args, 1)?)
            }),
        ],
    );
    registry.defjvp(
        &POWER,
        vec![
            jvp(move |g, ans, args, _| broadcast_to(&power_base(g, args)?, ans)),
            jvp(move |g, ans, args, _| broadcast_to(&power_exponent(g, ans, args)?, ans)),
        ],
    );
}

// =============================================================================
// Dot
// =============================================================================

/// Cotangent of `dot(a, b)` with respect to `a` (argnum 0) or `b`.
fn dot_vjp(argnum: usize, g: &Var, a: &Var, b: &Var) -> AutodiffResult<Var> {
    match (a.ndim(), b.ndim(), argnum) {
        (0, _, 0) | (_, 0, 0) => unbroadcast(&g.mul(b)?, a),
        (0, _, _) | (_, 0, _) => unbroadcast(&g.mul(a)?, b),
        // (k)·(k) -> 0-d
        (1, 1, 0) => g.mul(b),
        (1, 1, _) => g.mul(a),
        // (m,k)·(k,n) -> (m,n)
        (2, 2, 0) => g.dot(&b.transpose()?),
        (2, 2, _) => a.transpose()?.dot(g),
        // (m,k)·(k) -> (m)
        (2, 1, 0) => outer(g, b),
        (2, 1, _) => a.transpose()?.dot(g),
        // (k)·(k,n) -> (n)
        (1, 2, 0) => b.dot(g),
        _ => outer(a, g),
    }
}

fn install_dot(registry: &Registry) {
    registry.defvjp(
        &DOT,
        vec![
            vjp(|g, _, args, _| dot_vjp(0, g, arg("dot", args, 0)?, arg("dot", args, 1)?)),
            vjp(|g, _, args, _| dot_vjp(1, g, arg("dot", args, 0)?, arg("dot", args, 1)?)),
        ],
    );
    registry.def_linear(&DOT);
}

// =============================================================================
// Reductions
// =============================================================================

fn install_reductions(registry: &Registry) {
    registry.defvjp(
        &SUM,
        vec![vjp(|g, _, args, attrs| {
            g.repeat(arg("sum", args, 0)?.shape(), attrs.axis("axis")?)
        })],
    );
    registry.def_linear(&SUM);

    registry.defvjp(
        &REPEAT,
        vec![vjp(|g, _, args, attrs| {
            let x = arg("repeat", args, 0)?;
            let summed = match attrs.axis("axis")? {
                Some(axis) => g.sum_axis(axis)?,
                None => g.sum()?,
            };
            summed.reshape(x.shape())
        })],
    );
    registry.def_linear(&REPEAT);

    // d logsumexp = softmax(x)
    let softmax = |args: &[Var], ans: &Var| arg("logsumexp", args, 0)?.sub(ans)?.exp();
    registry.defvjp(
        &LOGSUMEXP,
        vec![vjp(move |g, ans, args, _| g.mul(&softmax(args, ans)?))],
    );
    registry.defjvp(
        &LOGSUMEXP,
        vec![jvp(move |g, ans, args, _| g.mul(&softmax(args, ans)?)?.sum())],
    );
}

// =============================================================================
// Shape manipulation
// =============================================================================

fn install_shape_ops(registry: &Registry) {
    registry.defvjp(
        &RESHAPE,
        vec![vjp(|g, _, args, _| g.reshape(arg("reshape", args, 0)?.shape()))],
    );
    registry.def_linear(&RESHAPE);

    registry.defvjp(&TRANSPOSE, vec![vjp(|g, _, _, _| g.transpose())]);
    registry.def_linear(&TRANSPOSE);

    registry.defvjp(
        &SLICE,
        vec![vjp(|g, _, args, attrs| {
            g.embed(attrs.usize("start")?, arg("slice", args, 0)?.shape())
        })],
    );
    registry.def_linear(&SLICE);

    registry.defvjp(
        &EMBED,
        vec![vjp(|g, _, args, attrs| {
            let x = arg("embed", args, 0)?;
            let start = attrs.usize("start")?;
            g.slice(start, start + x.size())?.reshape(x.shape())
        })],
    );
    registry.def_linear(&EMBED);
}

// =============================================================================
// Variadic joins
// =============================================================================

/// Replaces every argument except `argnum` with zeros.
fn zeros_except(argnum: usize, g: &Var, args: &[Var]) -> Vec<Var> {
    args.iter()
        .enumerate()
        .map(|(i, a)| if i == argnum { g.clone() } else { a.zeros_like() })
        .collect()
}

fn install_joins(registry: &Registry) {
    registry.defvjp_argnum(
        &CONCATENATE,
        vjp_argnum(|argnum, g, _, args, _| {
            let offset: usize = args.iter().take(argnum).map(Var::size).sum();
            let x = arg("concatenate", args, argnum)?;
            g.slice(offset, offset + x.size())?.reshape(x.shape())
        }),
    );
    let concat_jvp: JvpArgnumFn =
        Arc::new(|argnum: usize, g: &Var, _: &Var, args: &[Var], _: &Attrs| {
            concatenate(&zeros_except(argnum, g, args))
        });
    registry.defjvp_argnum(&CONCATENATE, concat_jvp);

    registry.defvjp_argnum(
        &STACK,
        vjp_argnum(|argnum, g, _, args, _| {
            let x = arg("stack", args, argnum)?;
            let offset = argnum * x.size();
            g.slice(offset, offset + x.size())?.reshape(x.shape())
        }),
    );
    let stack_jvp: JvpArgnumFn =
        Arc::new(|argnum: usize, g: &Var, _: &Var, args: &[Var], _: &Attrs| {
            stack(&zeros_except(argnum, g, args))
        });
    registry.defjvp_argnum(&STACK, stack_jvp);
}
