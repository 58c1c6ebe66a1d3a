//! Computation graph nodes.
//!
//! A [`Node`] records one primitive invocation observed while tracing. Nodes
//! are immutable once built and refer to their parents through shared `Rc`
//! handles, so the graph is a DAG that grows append-only.
//!
//! # Ordering
//!
//! Node identifiers come from a process-wide monotonic counter. A node's
//! parents always exist before it does, so `parent.id() < child.id()` holds
//! for every edge. Decreasing id order is therefore a valid reverse
//! topological order, and increasing id order a valid forward one.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracegrad_core::Attrs;

use crate::context::Level;
use crate::primitive::Primitive;
use crate::registry::PrimitiveRules;
use crate::tracer::Var;

/// Identifier of a node, ordered by construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Raw counter value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

static NEXT_NODE: AtomicU64 = AtomicU64::new(0);

fn next_id() -> NodeId {
    NodeId(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
}

/// Edge from a node to the node that produced one of its traced arguments.
#[derive(Clone)]
pub struct Parent {
    argnum: usize,
    node: Rc<Node>,
}

impl Parent {
    /// Argument position the parent fed.
    #[inline]
    pub fn argnum(&self) -> usize {
        self.argnum
    }

    /// The producing node.
    #[inline]
    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }
}

pub(crate) struct Operation {
    primitive: Primitive,
    rules: Arc<PrimitiveRules>,
    parents: Vec<Parent>,
    args: Vec<Var>,
    attrs: Attrs,
}

/// One recorded primitive call, or a root standing for a differentiation
/// variable.
pub struct Node {
    id: NodeId,
    level: Level,
    op: Option<Operation>,
    value: Var,
}

impl Node {
    /// Creates a root: a node with no primitive and no parents.
    pub(crate) fn root(value: Var, level: Level) -> Rc<Node> {
        Rc::new(Node {
            id: next_id(),
            level,
            op: None,
            value,
        })
    }

    /// Records a primitive call.
    ///
    /// `parents` lists `(argnum, node)` for each argument traced at `level`;
    /// `args` holds every positional argument with those tracers unwrapped.
    pub(crate) fn record(
        level: Level,
        primitive: Primitive,
        rules: Arc<PrimitiveRules>,
        parents: Vec<(usize, Rc<Node>)>,
        args: Vec<Var>,
        attrs: Attrs,
        value: Var,
    ) -> Rc<Node> {
        let id = next_id();
        debug_assert!(parents.iter().all(|(_, parent)| parent.id < id));
        let parents = parents
            .into_iter()
            .map(|(argnum, node)| Parent { argnum, node })
            .collect();
        Rc::new(Node {
            id,
            level,
            op: Some(Operation {
                primitive,
                rules,
                parents,
                args,
                attrs,
            }),
            value,
        })
    }

    /// Construction-ordered identifier.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Level of the trace that recorded this node.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Output of the recorded call, one level unwrapped.
    #[inline]
    pub fn value(&self) -> &Var {
        &self.value
    }

    /// Whether this node is a differentiation root.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.op.is_none()
    }

    /// Primitive invoked, or `None` for roots.
    pub fn primitive(&self) -> Option<&Primitive> {
        self.op.as_ref().map(|op| &op.primitive)
    }

    /// Parent edges in argument order.
    pub fn parents(&self) -> &[Parent] {
        self.op.as_ref().map_or(&[], |op| op.parents.as_slice())
    }

    /// Positional arguments as seen by the raw computation at this level.
    pub fn args(&self) -> &[Var] {
        self.op.as_ref().map_or(&[], |op| op.args.as_slice())
    }

    /// Arguments that were not traced at this node's level, with positions.
    pub fn non_traced_args(&self) -> impl Iterator<Item = (usize, &Var)> + '_ {
        let parents = self.parents();
        self.args()
            .iter()
            .enumerate()
            .filter(move |(argnum, _)| !parents.iter().any(|p| p.argnum == *argnum))
    }

    /// Keyword arguments, or `None` for roots.
    pub fn attrs(&self) -> Option<&Attrs> {
        self.op.as_ref().map(|op| &op.attrs)
    }

    pub(crate) fn rules(&self) -> Option<&Arc<PrimitiveRules>> {
        self.op.as_ref().map(|op| &op.rules)
    }

    pub(crate) fn operation(&self) -> Option<(&Primitive, &PrimitiveRules, &[Var], &Attrs)> {
        self.op
            .as_ref()
            .map(|op| (&op.primitive, op.rules.as_ref(), op.args.as_slice(), &op.attrs))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parents: Vec<NodeId> = self.parents().iter().map(|p| p.node.id).collect();
        f.debug_struct("Node")
            .field("id", &self.id.0)
            .field("level", &self.level)
            .field("primitive", &self.primitive().map(Primitive::name))
            .field("parents", &parents)
            .field("shape", &self.value.shape())
            .finish()
    }
}

// Long chains (loops of thousands of primitive calls) would otherwise drop
// recursively and exhaust the stack.
impl Drop for Node {
    fn drop(&mut self) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        let mut pending: Vec<Rc<Node>> = std::mem::take(&mut op.parents)
            .into_iter()
            .map(|p| p.node)
            .collect();
        while let Some(node) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(node) {
                if let Some(op) = node.op.as_mut() {
                    pending.extend(std::mem::take(&mut op.parents).into_iter().map(|p| p.node));
                }
            }
        }
    }
}
