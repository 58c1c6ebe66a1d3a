//! Traced primitive library.
//!
//! Every raw kernel in [`tracegrad_core::array::kernels`] is exposed here as
//! a process-wide [`Primitive`] with derivative rules installed in the global
//! registry (see [`rules`]). User code calls the methods on [`Var`]; those
//! calls are transparent when nothing is traced.
//!
//! # Usage
//!
//! ```rust
//! use tracegrad_engine::numpy::{stack, vdot};
//! use tracegrad_engine::Var;
//!
//! let x = Var::vector(vec![1.0, 2.0, 3.0]);
//! let y = x.mul(&x).unwrap().sum().unwrap();
//! assert_eq!(y.item().unwrap(), 14.0);
//!
//! assert_eq!(vdot(&x, &x).unwrap().item().unwrap(), 14.0);
//! assert_eq!(stack(&[x.clone(), x]).unwrap().shape(), &[2, 3]);
//! ```

pub mod rules;

use std::sync::LazyLock;

use tracegrad_core::array::kernels;
use tracegrad_core::{Array, Attrs, NumericResult};

use crate::error::AutodiffResult;
use crate::primitive::{arg, Primitive};
use crate::tracer::Var;

fn unary(name: &'static str, kernel: fn(&Array) -> Array) -> Primitive {
    Primitive::new(name, move |args, _| Ok(kernel(arg(name, args, 0)?)))
}

fn binary(name: &'static str, kernel: fn(&Array, &Array) -> NumericResult<Array>) -> Primitive {
    Primitive::new(name, move |args, _| {
        Ok(kernel(arg(name, args, 0)?, arg(name, args, 1)?)?)
    })
}

// =============================================================================
// Primitives
// =============================================================================

/// Elementwise negation.
pub static NEG: LazyLock<Primitive> = LazyLock::new(|| unary("negative", kernels::neg));
/// Elementwise exponential.
pub static EXP: LazyLock<Primitive> = LazyLock::new(|| unary("exp", kernels::exp));
/// Elementwise natural logarithm.
pub static LOG: LazyLock<Primitive> = LazyLock::new(|| unary("log", kernels::log));
/// Elementwise sine.
pub static SIN: LazyLock<Primitive> = LazyLock::new(|| unary("sin", kernels::sin));
/// Elementwise cosine.
pub static COS: LazyLock<Primitive> = LazyLock::new(|| unary("cos", kernels::cos));
/// Elementwise hyperbolic tangent.
pub static TANH: LazyLock<Primitive> = LazyLock::new(|| unary("tanh", kernels::tanh));
/// Elementwise square root.
pub static SQRT: LazyLock<Primitive> = LazyLock::new(|| unary("sqrt", kernels::sqrt));
/// Elementwise absolute value.
pub static ABS: LazyLock<Primitive> = LazyLock::new(|| unary("absolute", kernels::abs));
/// Elementwise sign.
pub static SIGN: LazyLock<Primitive> = LazyLock::new(|| unary("sign", kernels::sign));

/// Elementwise addition.
pub static ADD: LazyLock<Primitive> = LazyLock::new(|| binary("add", kernels::add));
/// Elementwise subtraction.
pub static SUB: LazyLock<Primitive> = LazyLock::new(|| binary("subtract", kernels::sub));
/// Elementwise multiplication.
pub static MUL: LazyLock<Primitive> = LazyLock::new(|| binary("multiply", kernels::mul));
/// Elementwise division.
pub static DIV: LazyLock<Primitive> = LazyLock::new(|| binary("divide", kernels::div));
/// Elementwise power.
pub static POWER: LazyLock<Primitive> = LazyLock::new(|| binary("power", kernels::power));
/// Generalised dot product.
pub static DOT: LazyLock<Primitive> = LazyLock::new(|| binary("dot", kernels::dot));

/// Sum over `axis` (attribute, `None` for all).
pub static SUM: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("sum", |args, attrs| {
        Ok(kernels::sum(arg("sum", args, 0)?, attrs.axis("axis")?)?)
    })
});

/// Broadcast to `shape` along `axis`; the adjoint of [`SUM`].
pub static REPEAT: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("repeat", |args, attrs| {
        let x = arg("repeat", args, 0)?;
        Ok(kernels::repeat(x, attrs.shape("shape")?, attrs.axis("axis")?)?)
    })
});

/// Reshape to `shape`.
pub static RESHAPE: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("reshape", |args, attrs| {
        Ok(kernels::reshape(arg("reshape", args, 0)?, attrs.shape("shape")?)?)
    })
});

/// Matrix transpose.
pub static TRANSPOSE: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("transpose", |args, _| {
        Ok(kernels::transpose(arg("transpose", args, 0)?)?)
    })
});

/// Raveled elements `[start, stop)`.
pub static SLICE: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("slice", |args, attrs| {
        let x = arg("slice", args, 0)?;
        Ok(kernels::slice(x, attrs.usize("start")?, attrs.usize("stop")?)?)
    })
});

/// Zero-padded placement into `shape` at `start`; the adjoint of [`SLICE`].
pub static EMBED: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("embed", |args, attrs| {
        let x = arg("embed", args, 0)?;
        Ok(kernels::embed(x, attrs.usize("start")?, attrs.shape("shape")?)?)
    })
});

/// Raveled join of any number of arrays.
pub static CONCATENATE: LazyLock<Primitive> =
    LazyLock::new(|| Primitive::new("concatenate", |args, _| Ok(kernels::concatenate(args))));

/// Stack of equally shaped arrays along a new leading axis.
pub static STACK: LazyLock<Primitive> =
    LazyLock::new(|| Primitive::new("stack", |args, _| Ok(kernels::stack(args)?)));

/// `log(sum(exp(x)))` over all elements.
pub static LOGSUMEXP: LazyLock<Primitive> = LazyLock::new(|| {
    Primitive::new("logsumexp", |args, _| {
        Ok(kernels::logsumexp(arg("logsumexp", args, 0)?))
    })
});

// =============================================================================
// Methods
// =============================================================================

fn call1(primitive: &Primitive, x: &Var, attrs: &Attrs) -> AutodiffResult<Var> {
    primitive.call(std::slice::from_ref(x), attrs)
}

fn call2(primitive: &Primitive, a: &Var, b: &Var) -> AutodiffResult<Var> {
    primitive.call(&[a.clone(), b.clone()], &Attrs::new())
}

impl Var {
    /// `-self`
    pub fn neg(&self) -> AutodiffResult<Var> {
        call1(&NEG, self, &Attrs::new())
    }

    /// `exp(self)`
    pub fn exp(&self) -> AutodiffResult<Var> {
        call1(&EXP, self, &Attrs::new())
    }

    /// `ln(self)`
    pub fn log(&self) -> AutodiffResult<Var> {
        call1(&LOG, self, &Attrs::new())
    }

    /// `sin(self)`
    pub fn sin(&self) -> AutodiffResult<Var> {
        call1(&SIN, self, &Attrs::new())
    }

    /// `cos(self)`
    pub fn cos(&self) -> AutodiffResult<Var> {
        call1(&COS, self, &Attrs::new())
    }

    /// `tanh(self)`
    pub fn tanh(&self) -> AutodiffResult<Var> {
        call1(&TANH, self, &Attrs::new())
    }

    /// `sqrt(self)`
    pub fn sqrt(&self) -> AutodiffResult<Var> {
        call1(&SQRT, self, &Attrs::new())
    }

    /// `|self|`
    pub fn abs(&self) -> AutodiffResult<Var> {
        call1(&ABS, self, &Attrs::new())
    }

    /// Elementwise sign.
    pub fn sign(&self) -> AutodiffResult<Var> {
        call1(&SIGN, self, &Attrs::new())
    }

    /// `self + other`
    pub fn add(&self, other: &Var) -> AutodiffResult<Var> {
        call2(&ADD, self, other)
    }

    /// `self - other`
    pub fn sub(&self, other: &Var) -> AutodiffResult<Var> {
        call2(&SUB, self, other)
    }

    /// `self * other`
    pub fn mul(&self, other: &Var) -> AutodiffResult<Var> {
        call2(&MUL, self, other)
    }

    /// `self / other`
    pub fn div(&self, other: &Var) -> AutodiffResult<Var> {
        call2(&DIV, self, other)
    }

    /// `self ** exponent`
    pub fn power(&self, exponent: &Var) -> AutodiffResult<Var> {
        call2(&POWER, self, exponent)
    }

    /// `self ** exponent` with a constant exponent.
    pub fn powf(&self, exponent: f64) -> AutodiffResult<Var> {
        self.power(&Var::scalar(exponent))
    }

    /// `self * self`
    pub fn square(&self) -> AutodiffResult<Var> {
        self.mul(self)
    }

    /// Generalised dot product.
    pub fn dot(&self, other: &Var) -> AutodiffResult<Var> {
        call2(&DOT, self, other)
    }

    /// Sum of all elements (0-d).
    pub fn sum(&self) -> AutodiffResult<Var> {
        call1(&SUM, self, &Attrs::new().with_axis("axis", None))
    }

    /// Sum over one axis.
    pub fn sum_axis(&self, axis: usize) -> AutodiffResult<Var> {
        call1(&SUM, self, &Attrs::new().with_axis("axis", Some(axis)))
    }

    /// Mean of all elements (0-d).
    pub fn mean(&self) -> AutodiffResult<Var> {
        self.sum()?.div(&Var::scalar(self.size() as f64))
    }

    /// Broadcast up to `shape`: fills it when `axis` is `None`, otherwise
    /// repeats along `axis`.
    pub fn repeat(&self, shape: &[usize], axis: Option<usize>) -> AutodiffResult<Var> {
        let attrs = Attrs::new().with_shape("shape", shape).with_axis("axis", axis);
        call1(&REPEAT, self, &attrs)
    }

    /// Matrix transpose.
    pub fn transpose(&self) -> AutodiffResult<Var> {
        call1(&TRANSPOSE, self, &Attrs::new())
    }

    /// Same data under a new shape.
    pub fn reshape(&self, shape: &[usize]) -> AutodiffResult<Var> {
        call1(&RESHAPE, self, &Attrs::new().with_shape("shape", shape))
    }

    /// Flattens to 1-d.
    pub fn ravel(&self) -> AutodiffResult<Var> {
        self.reshape(&[self.size()])
    }

    /// Raveled elements `[start, stop)` as a 1-d value.
    pub fn slice(&self, start: usize, stop: usize) -> AutodiffResult<Var> {
        let attrs = Attrs::new().with_usize("start", start).with_usize("stop", stop);
        call1(&SLICE, self, &attrs)
    }

    /// Places `self` raveled at `start` inside zeros of `shape`.
    pub fn embed(&self, start: usize, shape: &[usize]) -> AutodiffResult<Var> {
        let attrs = Attrs::new().with_usize("start", start).with_shape("shape", shape);
        call1(&EMBED, self, &attrs)
    }

    /// Raveled element `i` as a 0-d value.
    pub fn index(&self, i: usize) -> AutodiffResult<Var> {
        self.slice(i, i + 1)?.reshape(&[])
    }

    /// `log(sum(exp(self)))`
    pub fn logsumexp(&self) -> AutodiffResult<Var> {
        call1(&LOGSUMEXP, self, &Attrs::new())
    }
}

/// Stacks equally shaped values along a new leading axis.
pub fn stack(values: &[Var]) -> AutodiffResult<Var> {
    STACK.call(values, &Attrs::new())
}

/// Joins values raveled into one 1-d value.
pub fn concatenate(values: &[Var]) -> AutodiffResult<Var> {
    CONCATENATE.call(values, &Attrs::new())
}

/// Inner product of the raveled operands.
pub fn vdot(a: &Var, b: &Var) -> AutodiffResult<Var> {
    a.ravel()?.dot(&b.ravel()?)
}

/// Outer product of the raveled operands.
pub fn outer(a: &Var, b: &Var) -> AutodiffResult<Var> {
    let column = a.reshape(&[a.size(), 1])?;
    let row = b.reshape(&[1, b.size()])?;
    column.dot(&row)
}
