//! Error types for tracing and differentiation.
//!
//! No error is recovered internally: every failure propagates to the caller
//! of the differential operator, and a failed differentiation yields no
//! partial derivative.

use thiserror::Error;
use tracegrad_core::NumericError;

use crate::context::Level;

/// Errors raised by the engine.
///
/// # Examples
/// ```
/// use tracegrad_engine::AutodiffError;
///
/// let err = AutodiffError::NonScalarOutput { shape: vec![3] };
/// assert!(format!("{}", err).contains("use jacobian"));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutodiffError {
    /// A traced argument reached a primitive without any derivative rule.
    #[error("Primitive '{primitive}' has no registered derivative rule")]
    UnregisteredPrimitive {
        /// Primitive name
        primitive: String,
    },

    /// A derivative was requested for a position the primitive does not
    /// differentiate.
    #[error("Primitive '{primitive}' is not {mode}-differentiable in argument {argnum}")]
    NonDifferentiableArgument {
        /// Primitive name
        primitive: String,
        /// Argument position
        argnum: usize,
        /// `"reverse"` or `"forward"`
        mode: &'static str,
    },

    /// A rule produced a derivative whose shape disagrees with the value it
    /// belongs to.
    #[error("Shape mismatch in derivative for '{primitive}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Primitive whose rule produced the value
        primitive: String,
        /// Shape of the node value
        expected: Vec<usize>,
        /// Shape of the offending derivative
        found: Vec<usize>,
    },

    /// `grad` was applied to a function with a non-scalar output.
    #[error("Gradient requires a scalar output but got shape {shape:?}; use jacobian for non-scalar functions")]
    NonScalarOutput {
        /// Output shape
        shape: Vec<usize>,
    },

    /// A tracer outlived the trace scope that created it.
    #[error("Tracer from level {level} used after its trace scope ended")]
    LevelLeak {
        /// Level of the stale tracer
        level: Level,
    },

    /// A container did not have the structure an operation expected.
    #[error("Container structure mismatch: {0}")]
    StructureMismatch(String),

    /// A flat vector does not match the container it is unflattened into.
    #[error("Flat vector has shape {found:?} but the container needs [{expected}]")]
    FlatLengthMismatch {
        /// Total leaf size of the container
        expected: usize,
        /// Shape of the supplied vector
        found: Vec<usize>,
    },

    /// Failure inside a raw numeric kernel.
    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// Result type for engine operations.
pub type AutodiffResult<T> = Result<T, AutodiffError>;
