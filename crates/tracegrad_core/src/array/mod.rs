//! Dense row-major `f64` arrays.
//!
//! [`Array`] is the raw value type that flows through every primitive. It
//! carries no provenance; the engine wraps it when tracing.
//!
//! # Module Structure
//!
//! - [`kernels`]: Raw kernels evaluated by the engine's primitives

pub mod kernels;

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::{NumericError, NumericResult};

/// Dense `f64` array with an explicit shape.
///
/// A shape of `[]` denotes a 0-d (scalar) array holding exactly one element.
///
/// # Examples
///
/// ```rust
/// use tracegrad_core::Array;
///
/// let m = Array::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(m.shape(), &[2, 2]);
/// assert_eq!(m.size(), 4);
///
/// let s = Array::scalar(3.5);
/// assert!(s.is_scalar());
/// assert_eq!(s.item().unwrap(), 3.5);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Array {
    data: Vec<f64>,
    shape: Vec<usize>,
}

/// Number of elements implied by a shape.
#[inline]
pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Array {
    /// Creates an array from raw data, validating the element count.
    pub fn from_vec(data: Vec<f64>, shape: Vec<usize>) -> NumericResult<Self> {
        let expected = shape_size(&shape);
        if data.len() != expected {
            return Err(NumericError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    /// Creates a 0-d array.
    pub fn scalar(value: f64) -> Self {
        Self {
            data: vec![value],
            shape: Vec::new(),
        }
    }

    /// Creates a 1-d array.
    pub fn vector(data: Vec<f64>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    /// Creates a row-major 2-d array.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> NumericResult<Self> {
        Self::from_vec(data, vec![rows, cols])
    }

    /// Creates an array filled with `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            data: vec![value; shape_size(shape)],
            shape: shape.to_vec(),
        }
    }

    /// Creates an array of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Creates an array of ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Zeros with the shape of `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape)
    }

    /// Ones with the shape of `self`.
    pub fn ones_like(&self) -> Self {
        Self::ones(&self.shape)
    }

    /// One-hot array: zero everywhere except `1.0` at raveled position `index`.
    pub fn basis(shape: &[usize], index: usize) -> NumericResult<Self> {
        let size = shape_size(shape);
        if index >= size {
            return Err(NumericError::SliceOutOfBounds {
                start: index,
                stop: index + 1,
                size,
            });
        }
        let mut out = Self::zeros(shape);
        out.data[index] = 1.0;
        Ok(out)
    }

    /// Shape of the array.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Rank of the array.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Raveled element storage.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Consumes the array, returning its storage.
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Whether the array is 0-d.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// The single element of a size-1 array.
    pub fn item(&self) -> NumericResult<f64> {
        match self.data.as_slice() {
            [value] => Ok(*value),
            _ => Err(NumericError::NotAScalar { size: self.size() }),
        }
    }

    /// Element at a multi-dimensional index, if in bounds.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.data.get(offset).copied()
    }

    /// Applies `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Maximum absolute elementwise difference against `other`, if shapes agree.
    pub fn max_abs_diff(&self, other: &Array) -> Option<f64> {
        if self.shape != other.shape {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl From<Vec<f64>> for Array {
    fn from(data: Vec<f64>) -> Self {
        Self::vector(data)
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            return write!(f, "{}", self.data[0]);
        }
        write!(f, "array({:?}, shape={:?})", self.data, self.shape)
    }
}
