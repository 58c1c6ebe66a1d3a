//! Reverse engine: cotangent accumulation over a recorded graph.
//!
//! # Algorithm
//!
//! Nodes are processed in strictly decreasing id order using a max-heap.
//! Since every parent predates its children, a node is only popped after
//! all of its consumers have contributed. The accumulator holds at most one
//! entry per node; a second contribution is summed into the first with a
//! traced `add`, so accumulation itself is differentiable.
//!
//! Zeros are never materialised for nodes with a single consumer. Roots that
//! no path reaches receive zeros of their shape at the end.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use crate::error::{AutodiffError, AutodiffResult};
use crate::node::{Node, NodeId};
use crate::tracer::Var;

/// Heap entry ordered by node id.
struct Pending(Rc<Node>);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.id().cmp(&other.0.id())
    }
}

fn primitive_name(node: &Node) -> String {
    node.primitive()
        .map_or_else(|| "<root>".to_string(), |p| p.name().to_string())
}

fn check_shape(primitive: &str, expected: &Var, found: &Var) -> AutodiffResult<()> {
    if expected.shape() != found.shape() {
        return Err(AutodiffError::ShapeMismatch {
            primitive: primitive.to_string(),
            expected: expected.shape().to_vec(),
            found: found.shape().to_vec(),
        });
    }
    Ok(())
}

/// Propagates `seed` from `end` back to each of `roots`.
///
/// Returns one cotangent per root, in order. Only nodes recorded at
/// `end`'s level are traversed; anything else is an opaque leaf.
///
/// # Errors
///
/// - `ShapeMismatch` if the seed or any rule output has the wrong shape
/// - `NonDifferentiableArgument` if a cotangent reaches a position without
///   a reverse rule
pub fn backward_pass(end: &Rc<Node>, seed: Var, roots: &[Rc<Node>]) -> AutodiffResult<Vec<Var>> {
    check_shape(&primitive_name(end), end.value(), &seed)?;
    let level = end.level();

    let mut results: HashMap<NodeId, Var> = HashMap::new();
    let mut cotangents: HashMap<NodeId, Var> = HashMap::new();
    let mut heap = BinaryHeap::new();
    cotangents.insert(end.id(), seed);
    heap.push(Pending(Rc::clone(end)));

    let mut visited = 0usize;
    while let Some(Pending(node)) = heap.pop() {
        let Some(g) = cotangents.remove(&node.id()) else {
            continue;
        };
        visited += 1;
        if roots.iter().any(|root| root.id() == node.id()) {
            results.insert(node.id(), g.clone());
        }
        let Some((primitive, rules, args, attrs)) = node.operation() else {
            continue;
        };

        for parent in node.parents() {
            let parent_node = parent.node();
            if parent_node.level() != level {
                continue;
            }
            let vjp = rules.make_vjp(primitive, parent.argnum(), node.value(), args, attrs)?;
            let contribution = vjp(&g)?;
            check_shape(primitive.name(), parent_node.value(), &contribution)?;

            match cotangents.entry(parent_node.id()) {
                Entry::Occupied(mut slot) => {
                    let summed = slot.get().add(&contribution)?;
                    slot.insert(summed);
                }
                Entry::Vacant(slot) => {
                    slot.insert(contribution);
                    heap.push(Pending(Rc::clone(parent_node)));
                }
            }
        }
    }

    tracing::debug!(level = %level, nodes = visited, "backward pass complete");
    Ok(roots
        .iter()
        .map(|root| {
            results
                .remove(&root.id())
                .unwrap_or_else(|| root.value().zeros_like())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceScope;
    use crate::tracer::Tracer;
    use approx::assert_relative_eq;

    fn traced_root(value: f64, scope: &TraceScope) -> (Rc<Node>, Var) {
        let root = Node::root(Var::scalar(value), scope.level());
        let var = Var::Traced(Tracer::new(Rc::clone(&root)));
        (root, var)
    }

    fn end_node(v: &Var) -> Rc<Node> {
        Rc::clone(v.as_tracer().unwrap().node())
    }

    #[test]
    fn test_fan_in_sums_contributions() {
        let scope = TraceScope::enter();
        let (root, x) = traced_root(3.0, &scope);
        // y = x*x + x
        let y = x.mul(&x).unwrap().add(&x).unwrap();

        let grads = backward_pass(&end_node(&y), Var::scalar(1.0), &[root]).unwrap();
        assert_relative_eq!(grads[0].item().unwrap(), 7.0);
    }

    #[test]
    fn test_unreached_root_gets_zeros() {
        let scope = TraceScope::enter();
        let (root_a, a) = traced_root(1.0, &scope);
        let (root_b, _b) = traced_root(2.0, &scope);
        let y = a.exp().unwrap();

        let grads = backward_pass(&end_node(&y), Var::scalar(1.0), &[root_a, root_b]).unwrap();
        assert_relative_eq!(grads[0].item().unwrap(), 1f64.exp());
        assert_eq!(grads[1].item().unwrap(), 0.0);
    }

    #[test]
    fn test_seed_shape_is_checked() {
        let scope = TraceScope::enter();
        let (root, x) = traced_root(1.0, &scope);
        let y = x.sin().unwrap();

        let err = backward_pass(&end_node(&y), Var::vector(vec![1.0, 1.0]), &[root]).unwrap_err();
        assert!(matches!(err, AutodiffError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_long_chain_is_iterative() {
        let scope = TraceScope::enter();
        let (root, x) = traced_root(0.5, &scope);
        let mut y = x;
        for _ in 0..10_000 {
            y = y.mul(&Var::scalar(1.0)).unwrap();
        }
        let grads = backward_pass(&end_node(&y), Var::scalar(1.0), &[root]).unwrap();
        assert_eq!(grads[0].item().unwrap(), 1.0);
    }
}
