//! Recomputation-based checkpointing.
//!
//! [`checkpoint`] turns a function into a single primitive. Calling it on a
//! tracer records one node instead of the function's whole subgraph; the
//! derivative rules re-trace the function from the stored input when a
//! cotangent or tangent actually arrives.
//!
//! The raw evaluation runs the function on untraced values with the same
//! kernels, so results are bit-identical to an unwrapped call.
//!
//! # Usage
//!
//! ```rust
//! use tracegrad_engine::checkpoint::checkpoint;
//! use tracegrad_engine::{grad, Var};
//!
//! let block = checkpoint(|x: &Var| x.sin()?.exp());
//! let direct = grad(|x: &Var| x.sin()?.exp())(&Var::scalar(0.4)).unwrap();
//! let saved = grad(|x: &Var| block.call(x))(&Var::scalar(0.4)).unwrap();
//! assert!((direct.item().unwrap() - saved.item().unwrap()).abs() < 1e-14);
//! ```

use std::sync::Arc;

use tracegrad_core::Attrs;

use crate::differential::{jvp, vjp};
use crate::error::AutodiffResult;
use crate::primitive::{arg, Primitive};
use crate::registry::{self, JvpArgnumFn, VjpArgnumMaker, VjpFn};
use crate::tracer::Var;

/// Owns the registry entry of a checkpoint primitive.
#[derive(Debug)]
struct CheckpointHandle {
    primitive: Primitive,
}

impl Drop for CheckpointHandle {
    fn drop(&mut self) {
        registry::remove(&self.primitive);
    }
}

/// A function wrapped as a recomputing primitive.
///
/// Clones share one registry entry, removed when the last clone is dropped.
/// Nodes already recorded keep their own reference to the rules.
#[derive(Clone, Debug)]
pub struct Checkpointed {
    handle: Arc<CheckpointHandle>,
}

impl Checkpointed {
    /// Applies the wrapped function.
    pub fn call(&self, x: &Var) -> AutodiffResult<Var> {
        self.handle
            .primitive
            .call(std::slice::from_ref(x), &Attrs::new())
    }

    /// The primitive standing in for the function in recorded graphs.
    pub fn primitive(&self) -> &Primitive {
        &self.handle.primitive
    }
}

/// Wraps `f` so that its intermediate nodes are not retained.
///
/// Each call registers a fresh primitive in the global registry, held for
/// as long as the returned [`Checkpointed`] lives.
pub fn checkpoint<F>(f: F) -> Checkpointed
where
    F: Fn(&Var) -> AutodiffResult<Var> + Send + Sync + 'static,
{
    let f = Arc::new(f);

    let eval_f = Arc::clone(&f);
    let primitive = Primitive::new("checkpoint", move |args, _| {
        let x = Var::from((*arg("checkpoint", args, 0)?).clone());
        Ok(eval_f(&x)?.to_array())
    });

    let vjp_f = Arc::clone(&f);
    let maker: VjpArgnumMaker = Arc::new(move |_argnum: usize, _ans: &Var, args: &[Var], _: &Attrs| {
        let f = Arc::clone(&vjp_f);
        let x = arg("checkpoint", args, 0)?.clone();
        let pullback: VjpFn = Box::new(move |g: &Var| {
            let (_, pullback) = vjp(|x: &Var| f(x), &x)?;
            pullback.call(g)
        });
        Ok(pullback)
    });
    registry::defvjp_argnum(&primitive, maker);

    let jvp_f = Arc::clone(&f);
    let rule: JvpArgnumFn =
        Arc::new(move |_argnum: usize, g: &Var, _ans: &Var, args: &[Var], _: &Attrs| {
            let x = arg("checkpoint", args, 0)?;
            jvp(|x: &Var| jvp_f(x), x, g).map(|(_, tangent)| tangent)
        });
    registry::defjvp_argnum(&primitive, rule);

    Checkpointed {
        handle: Arc::new(CheckpointHandle { primitive }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceScope;
    use crate::differential::{deriv, grad, hessian};
    use crate::node::Node;
    use crate::tracer::Tracer;
    use approx::assert_relative_eq;
    use std::rc::Rc;

    fn block(x: &Var) -> AutodiffResult<Var> {
        x.tanh()?.mul(x)?.add(&x.square()?)
    }

    #[test]
    fn test_untraced_result_is_bit_identical() {
        let wrapped = checkpoint(block);
        let x = Var::vector(vec![0.1, -0.7, 2.3]);
        assert_eq!(wrapped.call(&x).unwrap(), block(&x).unwrap());
    }

    #[test]
    fn test_gradient_matches_unwrapped() {
        let wrapped = checkpoint(block);
        let x = Var::scalar(0.8);
        let direct = grad(block)(&x).unwrap();
        let saved = grad(|x: &Var| wrapped.call(x))(&x).unwrap();
        assert_relative_eq!(direct.item().unwrap(), saved.item().unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn test_only_one_node_is_retained() {
        let wrapped = checkpoint(block);
        let scope = TraceScope::enter();
        let root = Node::root(Var::scalar(0.3), scope.level());
        let x = Var::Traced(Tracer::new(Rc::clone(&root)));

        let y = wrapped.call(&x).unwrap();
        let node = y.as_tracer().unwrap().node();
        assert_eq!(node.primitive(), Some(wrapped.primitive()));
        assert_eq!(node.parents().len(), 1);
        assert_eq!(node.parents()[0].node().id(), root.id());
    }

    #[test]
    fn test_drop_removes_registry_entry() {
        let wrapped = checkpoint(block);
        let primitive = wrapped.primitive().clone();
        let clone = wrapped.clone();
        drop(wrapped);
        assert!(registry::lookup(&primitive).is_some());
        drop(clone);
        assert!(registry::lookup(&primitive).is_none());
    }

    #[test]
    fn test_graph_outlives_checkpoint() {
        let x = Var::scalar(0.8);
        let (_, pullback) = vjp(|x: &Var| checkpoint(block).call(x), &x).unwrap();
        let saved = pullback.call(&Var::scalar(1.0)).unwrap();
        let direct = grad(block)(&x).unwrap();
        assert_relative_eq!(direct.item().unwrap(), saved.item().unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn test_forward_and_second_order() {
        let wrapped = checkpoint(block);
        let x = Var::scalar(0.5);
        let t = deriv(|x: &Var| wrapped.call(x))(&x).unwrap();
        let g = grad(block)(&x).unwrap();
        assert_relative_eq!(t.item().unwrap(), g.item().unwrap(), epsilon = 1e-12);

        let h_wrapped = hessian(|x: &Var| wrapped.call(x))(&x).unwrap();
        let h_direct = hessian(block)(&x).unwrap();
        assert_relative_eq!(
            h_wrapped.item().unwrap(),
            h_direct.item().unwrap(),
            epsilon = 1e-12
        );
    }
}
