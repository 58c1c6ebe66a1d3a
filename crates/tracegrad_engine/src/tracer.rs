//! The traced value type.
//!
//! [`Var`] is what user functions receive and return: either a plain array
//! or a [`Tracer`] carrying provenance. A tracer's value is itself a `Var`,
//! which is how nesting works: inside `hessian`, the inner trace wraps
//! values that are already tracers of the outer trace.
//!
//! Primitive calls on `Var` are intercepted by [`crate::primitive`]; the
//! arithmetic methods live in [`crate::numpy`].

use std::fmt;
use std::rc::Rc;

use tracegrad_core::Array;

use crate::context::Level;
use crate::error::AutodiffResult;
use crate::node::Node;

/// A numeric value that may be traced.
#[derive(Clone)]
pub enum Var {
    /// Untraced array.
    Plain(Rc<Array>),
    /// Value recorded in a computation graph.
    Traced(Tracer),
}

/// Wrapped value that carries its nesting level and the node producing it.
#[derive(Clone)]
pub struct Tracer {
    node: Rc<Node>,
}

impl Tracer {
    pub(crate) fn new(node: Rc<Node>) -> Self {
        Self { node }
    }

    /// Level of the trace this tracer belongs to.
    #[inline]
    pub fn level(&self) -> Level {
        self.node.level()
    }

    /// Node that produced this value.
    #[inline]
    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    /// The wrapped value, one level down.
    #[inline]
    pub fn value(&self) -> &Var {
        self.node.value()
    }
}

impl Var {
    /// Untraced 0-d value.
    pub fn scalar(value: f64) -> Self {
        Var::Plain(Rc::new(Array::scalar(value)))
    }

    /// Untraced 1-d value.
    pub fn vector(data: Vec<f64>) -> Self {
        Var::Plain(Rc::new(Array::vector(data)))
    }

    /// Untraced value of any shape.
    pub fn from_vec(data: Vec<f64>, shape: Vec<usize>) -> AutodiffResult<Self> {
        Ok(Var::from(Array::from_vec(data, shape)?))
    }

    /// Whether this value is a tracer at any level.
    #[inline]
    pub fn is_traced(&self) -> bool {
        matches!(self, Var::Traced(_))
    }

    /// Level of the outermost wrapper, if traced.
    #[inline]
    pub fn level(&self) -> Option<Level> {
        match self {
            Var::Plain(_) => None,
            Var::Traced(tracer) => Some(tracer.level()),
        }
    }

    /// Tracer at the outermost wrapper, if any.
    pub fn as_tracer(&self) -> Option<&Tracer> {
        match self {
            Var::Plain(_) => None,
            Var::Traced(tracer) => Some(tracer),
        }
    }

    /// The raw array under every layer of tracing.
    pub fn array(&self) -> &Array {
        match self {
            Var::Plain(array) => array,
            Var::Traced(tracer) => tracer.value().array(),
        }
    }

    /// Copy of the raw array.
    pub fn to_array(&self) -> Array {
        self.array().clone()
    }

    /// Shape of the raw array.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.array().shape()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.array().size()
    }

    /// Number of axes.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.array().ndim()
    }

    /// The single element of a size-1 value.
    pub fn item(&self) -> AutodiffResult<f64> {
        Ok(self.array().item()?)
    }

    /// Untraced zeros of the same shape.
    pub fn zeros_like(&self) -> Var {
        Var::from(self.array().zeros_like())
    }

    /// Untraced ones of the same shape.
    pub fn ones_like(&self) -> Var {
        Var::from(self.array().ones_like())
    }

    /// Strips the wrapper belonging to `level`; anything else is returned as is.
    pub fn unbox(&self, level: Level) -> Var {
        match self {
            Var::Traced(tracer) if tracer.level() == level => tracer.value().clone(),
            other => other.clone(),
        }
    }
}

impl From<Array> for Var {
    fn from(array: Array) -> Self {
        Var::Plain(Rc::new(array))
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Var::scalar(value)
    }
}

impl From<Vec<f64>> for Var {
    fn from(data: Vec<f64>) -> Self {
        Var::vector(data)
    }
}

/// Compares raw values only; provenance is ignored.
impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.array() == other.array()
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Plain(array) => f.debug_tuple("Plain").field(array.as_ref()).finish(),
            Var::Traced(tracer) => f
                .debug_struct("Traced")
                .field("level", &tracer.level())
                .field("node", &tracer.node().id().get())
                .field("value", tracer.value())
                .finish(),
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.array(), f)
    }
}
