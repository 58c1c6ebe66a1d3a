//! Supporting types for the numeric layer.
//!
//! This module provides:
//! - `attrs`: Ordered keyword arguments attached to primitive calls
//! - `error`: Structured error type for kernel failures
//!
//! # Re-exports
//!
//! - [`Attrs`], [`AttrValue`] from `attrs`
//! - [`NumericError`], [`NumericResult`] from `error`

pub mod attrs;
pub mod error;

pub use attrs::{AttrValue, Attrs};
pub use error::{NumericError, NumericResult};
