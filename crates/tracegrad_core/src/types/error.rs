//! Error types for raw numeric kernels.
//!
//! Every kernel in [`crate::array::kernels`] reports failures through
//! [`NumericError`]. The engine layer wraps these transparently.

use thiserror::Error;

/// Errors raised while evaluating a raw numeric kernel.
///
/// # Examples
/// ```
/// use tracegrad_core::types::NumericError;
///
/// let err = NumericError::IncompatibleShapes {
///     op: "add".to_string(),
///     lhs: vec![2],
///     rhs: vec![3],
/// };
/// assert_eq!(format!("{}", err), "Incompatible shapes for 'add': [2] and [3]");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericError {
    /// Data length does not match the product of the shape.
    #[error("Shape {shape:?} requires {expected} elements but {actual} were provided")]
    DataLength {
        /// Requested shape
        shape: Vec<usize>,
        /// Element count implied by the shape
        expected: usize,
        /// Element count actually supplied
        actual: usize,
    },

    /// Operand shapes cannot be combined by the operation.
    #[error("Incompatible shapes for '{op}': {lhs:?} and {rhs:?}")]
    IncompatibleShapes {
        /// Operation name
        op: String,
        /// Left operand shape
        lhs: Vec<usize>,
        /// Right operand shape
        rhs: Vec<usize>,
    },

    /// Axis index exceeds the array rank.
    #[error("Axis {axis} out of bounds for array of rank {ndim}")]
    AxisOutOfBounds {
        /// Requested axis
        axis: usize,
        /// Rank of the array
        ndim: usize,
    },

    /// Reshape target has a different element count.
    #[error("Cannot reshape array of size {size} into shape {shape:?}")]
    InvalidReshape {
        /// Element count of the source array
        size: usize,
        /// Requested shape
        shape: Vec<usize>,
    },

    /// Slice bounds fall outside the raveled array.
    #[error("Slice [{start}, {stop}) out of bounds for array of size {size}")]
    SliceOutOfBounds {
        /// Inclusive start offset
        start: usize,
        /// Exclusive stop offset
        stop: usize,
        /// Element count of the array
        size: usize,
    },

    /// Wrong number of positional arguments.
    #[error("'{op}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        /// Operation name
        op: String,
        /// Expected argument count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Operand rank not supported by the operation.
    #[error("Unsupported operand shape for '{op}': {shape:?}")]
    UnsupportedRank {
        /// Operation name
        op: String,
        /// Offending shape
        shape: Vec<usize>,
    },

    /// Operation needs at least one operand.
    #[error("'{op}' requires at least one operand")]
    EmptyInput {
        /// Operation name
        op: String,
    },

    /// Single-element access on an array with more than one element.
    #[error("Expected a single element but array has {size}")]
    NotAScalar {
        /// Element count of the array
        size: usize,
    },

    /// Required keyword argument is missing.
    #[error("Missing attribute '{0}'")]
    MissingAttribute(String),

    /// Keyword argument exists but has the wrong kind.
    #[error("Attribute '{name}' has the wrong type: expected {expected}")]
    InvalidAttribute {
        /// Attribute name
        name: String,
        /// Expected kind
        expected: &'static str,
    },
}

/// Result type for numeric kernels.
pub type NumericResult<T> = Result<T, NumericError>;
