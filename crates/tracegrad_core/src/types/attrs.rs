//! Keyword arguments for primitive calls.
//!
//! Primitives take positional array arguments plus a small bag of
//! non-array parameters (an axis, a target shape, slice bounds). `Attrs`
//! keeps those parameters in insertion order so that a recorded call can be
//! replayed exactly.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::{NumericError, NumericResult};

/// A single keyword argument value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttrValue {
    /// Non-negative integer (offsets, counts)
    Usize(usize),
    /// Optional axis; `None` means "all axes"
    Axis(Option<usize>),
    /// Floating point parameter
    Float(f64),
    /// Array shape
    Shape(Vec<usize>),
}

/// Ordered keyword arguments attached to a primitive call.
///
/// # Examples
///
/// ```rust
/// use tracegrad_core::types::Attrs;
///
/// let attrs = Attrs::new().with_axis("axis", Some(1)).with_usize("start", 3);
/// assert_eq!(attrs.axis("axis").unwrap(), Some(1));
/// assert_eq!(attrs.usize("start").unwrap(), 3);
/// assert!(attrs.usize("stop").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attrs {
    entries: Vec<(String, AttrValue)>,
}

impl Attrs {
    /// Creates an empty attribute bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an attribute, keeping first-insertion order.
    pub fn set(&mut self, name: &str, value: AttrValue) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Builder form of [`Attrs::set`].
    pub fn with(mut self, name: &str, value: AttrValue) -> Self {
        self.set(name, value);
        self
    }

    /// Adds a `usize` attribute.
    pub fn with_usize(self, name: &str, value: usize) -> Self {
        self.with(name, AttrValue::Usize(value))
    }

    /// Adds an optional-axis attribute.
    pub fn with_axis(self, name: &str, axis: Option<usize>) -> Self {
        self.with(name, AttrValue::Axis(axis))
    }

    /// Adds a float attribute.
    pub fn with_float(self, name: &str, value: f64) -> Self {
        self.with(name, AttrValue::Float(value))
    }

    /// Adds a shape attribute.
    pub fn with_shape(self, name: &str, shape: &[usize]) -> Self {
        self.with(name, AttrValue::Shape(shape.to_vec()))
    }

    /// Looks up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no attributes are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    fn require(&self, name: &str) -> NumericResult<&AttrValue> {
        self.get(name)
            .ok_or_else(|| NumericError::MissingAttribute(name.to_string()))
    }

    /// Reads a `usize` attribute.
    pub fn usize(&self, name: &str) -> NumericResult<usize> {
        match self.require(name)? {
            AttrValue::Usize(value) => Ok(*value),
            _ => Err(invalid(name, "usize")),
        }
    }

    /// Reads an optional-axis attribute; a missing entry means `None`.
    pub fn axis(&self, name: &str) -> NumericResult<Option<usize>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Axis(axis)) => Ok(*axis),
            Some(AttrValue::Usize(axis)) => Ok(Some(*axis)),
            Some(_) => Err(invalid(name, "axis")),
        }
    }

    /// Reads a float attribute.
    pub fn float(&self, name: &str) -> NumericResult<f64> {
        match self.require(name)? {
            AttrValue::Float(value) => Ok(*value),
            _ => Err(invalid(name, "float")),
        }
    }

    /// Reads a shape attribute.
    pub fn shape(&self, name: &str) -> NumericResult<&[usize]> {
        match self.require(name)? {
            AttrValue::Shape(shape) => Ok(shape),
            _ => Err(invalid(name, "shape")),
        }
    }
}

fn invalid(name: &str, expected: &'static str) -> NumericError {
    NumericError::InvalidAttribute {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut attrs = Attrs::new().with_usize("start", 1).with_usize("stop", 4);
        attrs.set("start", AttrValue::Usize(2));

        let names: Vec<&str> = attrs.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["start", "stop"]);
        assert_eq!(attrs.usize("start").unwrap(), 2);
    }

    #[test]
    fn test_missing_axis_means_all_axes() {
        let attrs = Attrs::new();
        assert_eq!(attrs.axis("axis").unwrap(), None);
    }

    #[test]
    fn test_wrong_kind_is_reported() {
        let attrs = Attrs::new().with_float("exponent", 2.0);
        let err = attrs.shape("exponent").unwrap_err();
        assert_eq!(
            err,
            NumericError::InvalidAttribute {
                name: "exponent".to_string(),
                expected: "shape"
            }
        );
    }

    #[test]
    fn test_missing_required_attribute() {
        let attrs = Attrs::new();
        assert_eq!(
            attrs.usize("start").unwrap_err(),
            NumericError::MissingAttribute("start".to_string())
        );
    }
}
