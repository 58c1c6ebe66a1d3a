//! # tracegrad_core: Numeric Foundation for the tracegrad AD Engine
//!
//! ## Layer 1 (Foundation) Role
//!
//! tracegrad_core is the bottom layer of the workspace and knows nothing about
//! tracing or derivatives. It provides:
//! - A dense row-major `f64` array with an explicit shape (`array`)
//! - Raw kernels for every primitive the engine can differentiate (`array::kernels`)
//! - Keyword-argument bags passed alongside primitive arguments (`types::attrs`)
//! - Error types: `NumericError` (`types::error`)
//!
//! Every kernel is a pure function from input arrays to an output array whose
//! shape is a deterministic function of the input shapes. The engine relies on
//! this when it builds zero cotangents for unreached graph roots.
//!
//! ## Broadcasting
//!
//! Binary elementwise kernels accept operands of identical shape, or a 0-d
//! operand paired with an array of any shape. Nothing else broadcasts.
//!
//! ## Usage Examples
//!
//! ```rust
//! use tracegrad_core::array::{kernels, Array};
//!
//! let x = Array::vector(vec![1.0, 2.0, 3.0]);
//! let two = Array::scalar(2.0);
//!
//! let y = kernels::mul(&x, &two).unwrap();
//! assert_eq!(y.data(), &[2.0, 4.0, 6.0]);
//!
//! let total = kernels::sum(&y, None).unwrap();
//! assert_eq!(total.item().unwrap(), 12.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialisation for `Array` and `Attrs`

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod array;
pub mod types;

pub use array::Array;
pub use types::{AttrValue, Attrs, NumericError, NumericResult};
