//! Forward engine: tangent propagation over a recorded graph.
//!
//! The ancestors of the output node are visited in increasing id order,
//! which is construction order. Each node's tangent is the sum of the JVP
//! contributions from parents that carry a tangent; nodes with no traced
//! ancestry between the seeded root and the output keep an implicit zero.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{AutodiffError, AutodiffResult};
use crate::node::{Node, NodeId};
use crate::tracer::Var;

fn ancestors(end: &Rc<Node>) -> Vec<Rc<Node>> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![Rc::clone(end)];
    let mut order = Vec::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        for parent in node.parents() {
            if !seen.contains(&parent.node().id()) {
                stack.push(Rc::clone(parent.node()));
            }
        }
        order.push(node);
    }
    order.sort_by_key(|node| node.id());
    order
}

/// Propagates `tangent` from `root` to `end`.
///
/// # Errors
///
/// - `ShapeMismatch` if the seed or any rule output has the wrong shape
/// - `NonDifferentiableArgument` if a tangent reaches a position without a
///   forward rule
pub fn forward_pass(root: &Rc<Node>, tangent: Var, end: &Rc<Node>) -> AutodiffResult<Var> {
    if root.value().shape() != tangent.shape() {
        return Err(AutodiffError::ShapeMismatch {
            primitive: "<root>".to_string(),
            expected: root.value().shape().to_vec(),
            found: tangent.shape().to_vec(),
        });
    }
    let level = root.level();
    let mut tangents: HashMap<NodeId, Var> = HashMap::new();
    tangents.insert(root.id(), tangent);

    let order = ancestors(end);
    for node in order.iter().filter(|node| node.id() > root.id()) {
        let Some((primitive, rules, args, attrs)) = node.operation() else {
            continue;
        };
        let mut acc: Option<Var> = None;
        for parent in node.parents() {
            if parent.node().level() != level {
                continue;
            }
            let Some(t) = tangents.get(&parent.node().id()) else {
                continue;
            };
            let contribution = rules.apply_jvp(primitive, parent.argnum(), t, node.value(), args, attrs)?;
            if contribution.shape() != node.value().shape() {
                return Err(AutodiffError::ShapeMismatch {
                    primitive: primitive.name().to_string(),
                    expected: node.value().shape().to_vec(),
                    found: contribution.shape().to_vec(),
                });
            }
            acc = Some(match acc {
                Some(total) => total.add(&contribution)?,
                None => contribution,
            });
        }
        if let Some(t) = acc {
            tangents.insert(node.id(), t);
        }
    }

    tracing::debug!(level = %level, nodes = order.len(), "forward pass complete");
    Ok(tangents
        .remove(&end.id())
        .unwrap_or_else(|| end.value().zeros_like()))
}
