//! Raw numeric kernels.
//!
//! Each kernel is a pure function of its inputs. Unary elementwise kernels
//! cannot fail; everything that combines shapes returns [`NumericResult`].
//!
//! Reductions and their adjoints come in pairs so that derivative rules can be
//! expressed with kernels alone:
//!
//! | Kernel | Adjoint |
//! |--------|---------|
//! | [`sum`] | [`repeat`] |
//! | [`slice`] | [`embed`] |
//! | [`reshape`] | [`reshape`] |
//! | [`transpose`] | [`transpose`] |

use super::{shape_size, Array};
use crate::types::{NumericError, NumericResult};

// =============================================================================
// Unary elementwise
// =============================================================================

/// Elementwise negation.
pub fn neg(a: &Array) -> Array {
    a.map(|x| -x)
}

/// Elementwise exponential.
pub fn exp(a: &Array) -> Array {
    a.map(f64::exp)
}

/// Elementwise natural logarithm.
pub fn log(a: &Array) -> Array {
    a.map(f64::ln)
}

/// Elementwise sine.
pub fn sin(a: &Array) -> Array {
    a.map(f64::sin)
}

/// Elementwise cosine.
pub fn cos(a: &Array) -> Array {
    a.map(f64::cos)
}

/// Elementwise hyperbolic tangent.
pub fn tanh(a: &Array) -> Array {
    a.map(f64::tanh)
}

/// Elementwise square root.
pub fn sqrt(a: &Array) -> Array {
    a.map(f64::sqrt)
}

/// Elementwise absolute value.
pub fn abs(a: &Array) -> Array {
    a.map(f64::abs)
}

/// Elementwise sign; zero maps to zero.
pub fn sign(a: &Array) -> Array {
    a.map(|x| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

// =============================================================================
// Binary elementwise (0-d broadcasting only)
// =============================================================================

/// Output shape of a binary elementwise kernel.
pub fn broadcast_shape(op: &str, lhs: &[usize], rhs: &[usize]) -> NumericResult<Vec<usize>> {
    if lhs == rhs || rhs.is_empty() {
        Ok(lhs.to_vec())
    } else if lhs.is_empty() {
        Ok(rhs.to_vec())
    } else {
        Err(NumericError::IncompatibleShapes {
            op: op.to_string(),
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        })
    }
}

fn zip_with(op: &str, a: &Array, b: &Array, f: impl Fn(f64, f64) -> f64) -> NumericResult<Array> {
    let shape = broadcast_shape(op, a.shape(), b.shape())?;
    let data = match (a.is_scalar(), b.is_scalar()) {
        (true, false) => {
            let x = a.data()[0];
            b.data().iter().map(|&y| f(x, y)).collect()
        }
        (false, true) => {
            let y = b.data()[0];
            a.data().iter().map(|&x| f(x, y)).collect()
        }
        _ => a
            .data()
            .iter()
            .zip(b.data())
            .map(|(&x, &y)| f(x, y))
            .collect(),
    };
    Array::from_vec(data, shape)
}

/// Elementwise addition.
pub fn add(a: &Array, b: &Array) -> NumericResult<Array> {
    zip_with("add", a, b, |x, y| x + y)
}

/// Elementwise subtraction.
pub fn sub(a: &Array, b: &Array) -> NumericResult<Array> {
    zip_with("sub", a, b, |x, y| x - y)
}

/// Elementwise multiplication.
pub fn mul(a: &Array, b: &Array) -> NumericResult<Array> {
    zip_with("mul", a, b, |x, y| x * y)
}

/// Elementwise division.
pub fn div(a: &Array, b: &Array) -> NumericResult<Array> {
    zip_with("div", a, b, |x, y| x / y)
}

/// Elementwise power `a ** b`.
pub fn power(a: &Array, b: &Array) -> NumericResult<Array> {
    zip_with("power", a, b, f64::powf)
}

// =============================================================================
// Reductions and their adjoints
// =============================================================================

fn check_axis(axis: usize, ndim: usize) -> NumericResult<()> {
    if axis >= ndim {
        return Err(NumericError::AxisOutOfBounds { axis, ndim });
    }
    Ok(())
}

/// Splits a shape around `axis` into `(outer, len, inner)` extents.
fn axis_extents(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape_size(&shape[..axis]);
    let inner = shape_size(&shape[axis + 1..]);
    (outer, shape[axis], inner)
}

/// Sums over `axis`, or over all elements when `axis` is `None` (0-d result).
pub fn sum(a: &Array, axis: Option<usize>) -> NumericResult<Array> {
    let Some(axis) = axis else {
        return Ok(Array::scalar(a.data().iter().sum()));
    };
    check_axis(axis, a.ndim())?;
    let (outer, len, inner) = axis_extents(a.shape(), axis);
    let mut out = vec![0.0; outer * inner];
    for o in 0..outer {
        for k in 0..len {
            let src = (o * len + k) * inner;
            for i in 0..inner {
                out[o * inner + i] += a.data()[src + i];
            }
        }
    }
    let mut shape = a.shape().to_vec();
    shape.remove(axis);
    Array::from_vec(out, shape)
}

/// Broadcasts `a` up to `shape`: the adjoint of [`sum`].
///
/// With `axis = None`, `a` must hold one element which fills the whole shape.
/// With `axis = Some(k)`, `a` must have `shape` minus axis `k` and is repeated
/// along that axis.
pub fn repeat(a: &Array, shape: &[usize], axis: Option<usize>) -> NumericResult<Array> {
    let Some(axis) = axis else {
        let value = a.item()?;
        return Ok(Array::full(shape, value));
    };
    check_axis(axis, shape.len())?;
    let mut reduced = shape.to_vec();
    reduced.remove(axis);
    if reduced != a.shape() {
        return Err(NumericError::IncompatibleShapes {
            op: "repeat".to_string(),
            lhs: a.shape().to_vec(),
            rhs: shape.to_vec(),
        });
    }
    let (outer, len, inner) = axis_extents(shape, axis);
    let mut out = Vec::with_capacity(shape_size(shape));
    for o in 0..outer {
        for _ in 0..len {
            out.extend_from_slice(&a.data()[o * inner..(o + 1) * inner]);
        }
    }
    Array::from_vec(out, shape.to_vec())
}

/// Numerically stable `log(sum(exp(a)))` over all elements (0-d result).
pub fn logsumexp(a: &Array) -> Array {
    let max = a.data().iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Array::scalar(max);
    }
    let total: f64 = a.data().iter().map(|&x| (x - max).exp()).sum();
    Array::scalar(max + total.ln())
}

// =============================================================================
// Shape manipulation
// =============================================================================

/// Reinterprets the raveled data under a new shape of equal size.
pub fn reshape(a: &Array, shape: &[usize]) -> NumericResult<Array> {
    if shape_size(shape) != a.size() {
        return Err(NumericError::InvalidReshape {
            size: a.size(),
            shape: shape.to_vec(),
        });
    }
    Array::from_vec(a.data().to_vec(), shape.to_vec())
}

/// Matrix transpose; arrays of rank below 2 are returned unchanged.
pub fn transpose(a: &Array) -> NumericResult<Array> {
    match *a.shape() {
        [] | [_] => Ok(a.clone()),
        [rows, cols] => {
            let mut out = Vec::with_capacity(a.size());
            for c in 0..cols {
                for r in 0..rows {
                    out.push(a.data()[r * cols + c]);
                }
            }
            Array::from_vec(out, vec![cols, rows])
        }
        _ => Err(NumericError::UnsupportedRank {
            op: "transpose".to_string(),
            shape: a.shape().to_vec(),
        }),
    }
}

/// Elements `[start, stop)` of the raveled array, as a 1-d array.
pub fn slice(a: &Array, start: usize, stop: usize) -> NumericResult<Array> {
    if start > stop || stop > a.size() {
        return Err(NumericError::SliceOutOfBounds {
            start,
            stop,
            size: a.size(),
        });
    }
    Ok(Array::vector(a.data()[start..stop].to_vec()))
}

/// Places the raveled `a` at offset `start` inside zeros of `shape`: the
/// adjoint of [`slice`].
pub fn embed(a: &Array, start: usize, shape: &[usize]) -> NumericResult<Array> {
    let size = shape_size(shape);
    let stop = start
        .checked_add(a.size())
        .ok_or(NumericError::SliceOutOfBounds {
            start,
            stop: usize::MAX,
            size,
        })?;
    if stop > size {
        return Err(NumericError::SliceOutOfBounds { start, stop, size });
    }
    let mut out = Array::zeros(shape).into_data();
    out[start..stop].copy_from_slice(a.data());
    Array::from_vec(out, shape.to_vec())
}

/// Joins the raveled operands into one 1-d array.
pub fn concatenate(arrays: &[&Array]) -> Array {
    let data: Vec<f64> = arrays
        .iter()
        .flat_map(|a| a.data().iter().copied())
        .collect();
    Array::vector(data)
}

/// Stacks equally shaped operands along a new leading axis.
pub fn stack(arrays: &[&Array]) -> NumericResult<Array> {
    let Some(first) = arrays.first() else {
        return Err(NumericError::EmptyInput {
            op: "stack".to_string(),
        });
    };
    let mut data = Vec::with_capacity(first.size() * arrays.len());
    for a in arrays {
        if a.shape() != first.shape() {
            return Err(NumericError::IncompatibleShapes {
                op: "stack".to_string(),
                lhs: first.shape().to_vec(),
                rhs: a.shape().to_vec(),
            });
        }
        data.extend_from_slice(a.data());
    }
    let mut shape = Vec::with_capacity(first.ndim() + 1);
    shape.push(arrays.len());
    shape.extend_from_slice(first.shape());
    Array::from_vec(data, shape)
}

// =============================================================================
// Linear algebra
// =============================================================================

/// Generalised dot product.
///
/// - 0-d with anything: elementwise multiplication
/// - `(k) · (k)`: inner product (0-d)
/// - `(m, k) · (k, n)`: matrix product
/// - `(m, k) · (k)`: matrix-vector product
/// - `(k) · (k, n)`: vector-matrix product
pub fn dot(a: &Array, b: &Array) -> NumericResult<Array> {
    let mismatch = || NumericError::IncompatibleShapes {
        op: "dot".to_string(),
        lhs: a.shape().to_vec(),
        rhs: b.shape().to_vec(),
    };
    match (a.shape(), b.shape()) {
        ([], _) | (_, []) => mul(a, b),
        (&[k1], &[k2]) => {
            if k1 != k2 {
                return Err(mismatch());
            }
            let value = a.data().iter().zip(b.data()).map(|(x, y)| x * y).sum();
            Ok(Array::scalar(value))
        }
        (&[m, k1], &[k2, n]) => {
            if k1 != k2 {
                return Err(mismatch());
            }
            let data = matmul(a.data(), b.data(), m, k1, n);
            Array::from_vec(data, vec![m, n])
        }
        (&[m, k1], &[k2]) => {
            if k1 != k2 {
                return Err(mismatch());
            }
            let data = matmul(a.data(), b.data(), m, k1, 1);
            Array::from_vec(data, vec![m])
        }
        (&[k1], &[k2, n]) => {
            if k1 != k2 {
                return Err(mismatch());
            }
            let data = matmul(a.data(), b.data(), 1, k1, n);
            Array::from_vec(data, vec![n])
        }
        _ => Err(NumericError::UnsupportedRank {
            op: "dot".to_string(),
            shape: if a.ndim() > 2 {
                a.shape().to_vec()
            } else {
                b.shape().to_vec()
            },
        }),
    }
}

fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for p in 0..k {
            let lhs = a[i * k + p];
            for j in 0..n {
                out[i * n + j] += lhs * b[p * n + j];
            }
        }
    }
    out
}
