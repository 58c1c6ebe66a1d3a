//! Container-aware operators.
//!
//! Each operator flattens its structured argument, differentiates the flat
//! function with the plain operators, and rebuilds the container shape.

use crate::container::{flatten, Tree};
use crate::error::{AutodiffError, AutodiffResult};
use crate::tracer::Var;

use super::{grad, jacobian, value_and_grad};

/// Gradient of a scalar function of a container, shaped like the container.
///
/// Leaves the function ignores receive exact zeros.
///
/// # Examples
///
/// ```rust
/// use tracegrad_engine::container::Tree;
/// use tracegrad_engine::{grad_tree, Var};
///
/// let params = Tree::List(vec![Tree::leaf(2.0), Tree::leaf(5.0)]);
/// // only the first leaf is used
/// let f = |t: &Tree| t.at(0).and_then(Tree::as_leaf).unwrap().square();
/// let g = grad_tree(f)(&params).unwrap();
/// assert_eq!(g, Tree::List(vec![Tree::leaf(4.0), Tree::leaf(0.0)]));
/// ```
pub fn grad_tree<F>(f: F) -> impl Fn(&Tree) -> AutodiffResult<Tree>
where
    F: Fn(&Tree) -> AutodiffResult<Var>,
{
    move |tree: &Tree| value_and_grad_tree_impl(&f, tree).map(|(_, g)| g)
}

fn value_and_grad_tree_impl<F>(f: &F, tree: &Tree) -> AutodiffResult<(Var, Tree)>
where
    F: Fn(&Tree) -> AutodiffResult<Var>,
{
    let (flat, unflattener) = flatten(tree)?;
    let flat_f = |v: &Var| f(&unflattener.unflatten(v)?);
    let (value, g) = value_and_grad(flat_f)(&flat)?;
    Ok((value, unflattener.unflatten(&g)?))
}

/// Value and container-shaped gradient.
pub fn value_and_grad_tree<F>(f: F) -> impl Fn(&Tree) -> AutodiffResult<(Var, Tree)>
where
    F: Fn(&Tree) -> AutodiffResult<Var>,
{
    move |tree: &Tree| value_and_grad_tree_impl(&f, tree)
}

/// Jacobian of a container-to-container function as a flat
/// `[output_size, input_size]` matrix, in flattening order.
pub fn jacobian_tree<F>(f: F) -> impl Fn(&Tree) -> AutodiffResult<Var>
where
    F: Fn(&Tree) -> AutodiffResult<Tree>,
{
    move |tree: &Tree| {
        let (flat, unflattener) = flatten(tree)?;
        let flat_f = |v: &Var| {
            let out = f(&unflattener.unflatten(v)?)?;
            flatten(&out).map(|(flat_out, _)| flat_out)
        };
        let j = jacobian(flat_f)(&flat);
        j
    }
}

/// Gradients for every entry of a mapping argument, as a mapping.
///
/// # Errors
///
/// `StructureMismatch` if the argument is not a mapping.
pub fn multigrad_dict<F>(f: F) -> impl Fn(&Tree) -> AutodiffResult<Tree>
where
    F: Fn(&Tree) -> AutodiffResult<Var>,
{
    let grad_all = grad_tree(f);
    move |tree: &Tree| {
        if !matches!(tree, Tree::Dict(_)) {
            return Err(AutodiffError::StructureMismatch(
                "multigrad_dict expects a mapping argument".to_string(),
            ));
        }
        grad_all(tree)
    }
}

/// Gradient with respect to one named entry of a mapping; every other entry
/// is held constant.
///
/// # Errors
///
/// `StructureMismatch` if the argument is not a mapping or lacks `name`.
pub fn grad_named<F>(f: F, name: &str) -> impl Fn(&Tree) -> AutodiffResult<Tree>
where
    F: Fn(&Tree) -> AutodiffResult<Var>,
{
    let name = name.to_string();
    move |tree: &Tree| {
        let Tree::Dict(entries) = tree else {
            return Err(AutodiffError::StructureMismatch(
                "grad_named expects a mapping argument".to_string(),
            ));
        };
        let position = entries
            .iter()
            .position(|(key, _)| *key == name)
            .ok_or_else(|| AutodiffError::StructureMismatch(format!("no entry named '{name}'")))?;

        let (flat, unflattener) = flatten(&entries[position].1)?;
        let with_entry = |v: &Var| {
            let mut replaced = entries.clone();
            replaced[position].1 = unflattener.unflatten(v)?;
            f(&Tree::Dict(replaced))
        };
        let g = grad(with_entry)(&flat)?;
        unflattener.unflatten(&g)
    }
}
