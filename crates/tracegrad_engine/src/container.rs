//! Nested containers of numeric leaves and their flat representation.
//!
//! [`Tree`] is a closed variant over leaves, lists, tuples and insertion
//! ordered mappings. [`flatten`] ravels every leaf and joins them into one
//! 1-d value; the returned [`Unflattener`] rebuilds the structure with the
//! original per-leaf shapes.
//!
//! Both directions are built from traced primitives (`reshape`,
//! `concatenate`, `slice`), so a derivative computed against the flat vector
//! can be unflattened into the container shape, and dead leaves come back as
//! exact zeros.
//!
//! # Usage
//!
//! ```rust
//! use tracegrad_engine::container::{flatten, Tree};
//! use tracegrad_engine::Var;
//!
//! let params = Tree::dict(vec![
//!     ("w", Tree::leaf(Var::vector(vec![1.0, 2.0]))),
//!     ("b", Tree::leaf(Var::scalar(0.5))),
//! ]);
//! let (flat, unflattener) = flatten(&params).unwrap();
//! assert_eq!(flat.array().data(), &[1.0, 2.0, 0.5]);
//! assert_eq!(unflattener.unflatten(&flat).unwrap(), params);
//! ```

use tracegrad_core::array::shape_size;

use crate::error::{AutodiffError, AutodiffResult};
use crate::numpy::concatenate;
use crate::tracer::Var;

/// A nested container of numeric leaves.
#[derive(Clone, Debug, PartialEq)]
pub enum Tree {
    /// A single value.
    Leaf(Var),
    /// Ordered sequence.
    List(Vec<Tree>),
    /// Fixed-arity sequence.
    Tuple(Vec<Tree>),
    /// Mapping with keys kept in insertion order.
    Dict(Vec<(String, Tree)>),
}

impl Tree {
    /// Wraps a value as a leaf.
    pub fn leaf(value: impl Into<Var>) -> Self {
        Tree::Leaf(value.into())
    }

    /// Builds a mapping from `(key, subtree)` pairs.
    pub fn dict<K: Into<String>>(entries: Vec<(K, Tree)>) -> Self {
        Tree::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The value of a leaf node.
    pub fn as_leaf(&self) -> Option<&Var> {
        match self {
            Tree::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Entry `key` of a mapping.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Entry `index` of a list or tuple.
    pub fn at(&self, index: usize) -> Option<&Tree> {
        match self {
            Tree::List(items) | Tree::Tuple(items) => items.get(index),
            _ => None,
        }
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Tree::Leaf(value) => out.push(value),
            Tree::List(items) | Tree::Tuple(items) => {
                items.iter().for_each(|item| item.collect_leaves(out))
            }
            Tree::Dict(entries) => entries.iter().for_each(|(_, v)| v.collect_leaves(out)),
        }
    }

    /// Total number of scalar elements across all leaves.
    pub fn size(&self) -> usize {
        self.leaves().iter().map(|leaf| leaf.size()).sum()
    }

    /// Applies `f` to every leaf, keeping the structure.
    pub fn try_map(&self, f: &mut impl FnMut(&Var) -> AutodiffResult<Var>) -> AutodiffResult<Tree> {
        Ok(match self {
            Tree::Leaf(value) => Tree::Leaf(f(value)?),
            Tree::List(items) => Tree::List(
                items.iter().map(|item| item.try_map(f)).collect::<AutodiffResult<_>>()?,
            ),
            Tree::Tuple(items) => Tree::Tuple(
                items.iter().map(|item| item.try_map(f)).collect::<AutodiffResult<_>>()?,
            ),
            Tree::Dict(entries) => Tree::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.try_map(f)?)))
                    .collect::<AutodiffResult<_>>()?,
            ),
        })
    }
}

impl From<Var> for Tree {
    fn from(value: Var) -> Self {
        Tree::Leaf(value)
    }
}

/// Structure of a tree with leaf shapes in place of values.
#[derive(Clone, Debug, PartialEq)]
enum Skeleton {
    Leaf(Vec<usize>),
    List(Vec<Skeleton>),
    Tuple(Vec<Skeleton>),
    Dict(Vec<(String, Skeleton)>),
}

impl Skeleton {
    fn of(tree: &Tree) -> Self {
        match tree {
            Tree::Leaf(value) => Skeleton::Leaf(value.shape().to_vec()),
            Tree::List(items) => Skeleton::List(items.iter().map(Skeleton::of).collect()),
            Tree::Tuple(items) => Skeleton::Tuple(items.iter().map(Skeleton::of).collect()),
            Tree::Dict(entries) => Skeleton::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Skeleton::of(v)))
                    .collect(),
            ),
        }
    }

    fn size(&self) -> usize {
        match self {
            Skeleton::Leaf(shape) => shape_size(shape),
            Skeleton::List(items) | Skeleton::Tuple(items) => items.iter().map(Skeleton::size).sum(),
            Skeleton::Dict(entries) => entries.iter().map(|(_, v)| v.size()).sum(),
        }
    }

    fn rebuild(&self, flat: &Var, offset: &mut usize) -> AutodiffResult<Tree> {
        Ok(match self {
            Skeleton::Leaf(shape) => {
                let start = *offset;
                *offset += shape_size(shape);
                Tree::Leaf(flat.slice(start, *offset)?.reshape(shape)?)
            }
            Skeleton::List(items) => Tree::List(
                items
                    .iter()
                    .map(|item| item.rebuild(flat, offset))
                    .collect::<AutodiffResult<_>>()?,
            ),
            Skeleton::Tuple(items) => Tree::Tuple(
                items
                    .iter()
                    .map(|item| item.rebuild(flat, offset))
                    .collect::<AutodiffResult<_>>()?,
            ),
            Skeleton::Dict(entries) => Tree::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.rebuild(flat, offset)?)))
                    .collect::<AutodiffResult<_>>()?,
            ),
        })
    }
}

/// Rebuilds a container from a flat vector produced by [`flatten`].
#[derive(Clone, Debug)]
pub struct Unflattener {
    skeleton: Skeleton,
    size: usize,
}

impl Unflattener {
    /// Number of elements the flat vector must hold.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Splits `flat` back into the recorded structure and leaf shapes.
    ///
    /// # Errors
    ///
    /// `FlatLengthMismatch` unless `flat` is 1-d with exactly
    /// [`Unflattener::size`] elements.
    pub fn unflatten(&self, flat: &Var) -> AutodiffResult<Tree> {
        if flat.shape() != [self.size] {
            return Err(AutodiffError::FlatLengthMismatch {
                expected: self.size,
                found: flat.shape().to_vec(),
            });
        }
        let mut offset = 0;
        self.skeleton.rebuild(flat, &mut offset)
    }
}

/// Ravels and joins every leaf of `tree` into one 1-d value.
pub fn flatten(tree: &Tree) -> AutodiffResult<(Var, Unflattener)> {
    let raveled = tree
        .leaves()
        .into_iter()
        .map(Var::ravel)
        .collect::<AutodiffResult<Vec<_>>>()?;
    let flat = concatenate(&raveled)?;
    let skeleton = Skeleton::of(tree);
    let size = skeleton.size();
    Ok((flat, Unflattener { skeleton, size }))
}
