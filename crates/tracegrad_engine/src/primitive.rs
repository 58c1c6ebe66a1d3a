//! Primitives and the interceptor that records them.
//!
//! A [`Primitive`] wraps a raw kernel. Calling it through
//! [`Primitive::call`] is the only way graph nodes are created:
//!
//! 1. If no argument is traced, the raw kernel runs directly.
//! 2. Otherwise the innermost level `L` among the arguments is selected.
//!    Tracers at `L` are unwrapped and become parents of the new node; lower
//!    level tracers are passed through as constants.
//! 3. The call recurses on the unwrapped arguments, so outer levels record
//!    their own nodes before the level-`L` node is built around the result.
//!
//! Untraced calls never touch the registry or the context stack.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracegrad_core::{Array, Attrs};

use crate::context;
use crate::error::{AutodiffError, AutodiffResult};
use crate::node::Node;
use crate::registry;
use crate::tracer::{Tracer, Var};

/// Identity of a primitive, used as the registry key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(u64);

static NEXT_PRIMITIVE: AtomicU64 = AtomicU64::new(0);

/// Raw evaluation function of a primitive.
pub type EvalFn = Arc<dyn Fn(&[&Array], &Attrs) -> AutodiffResult<Array> + Send + Sync>;

struct PrimitiveInner {
    id: PrimitiveId,
    name: String,
    eval: EvalFn,
}

/// A registrable numeric operation.
///
/// Cloning is cheap and preserves identity.
#[derive(Clone)]
pub struct Primitive {
    inner: Arc<PrimitiveInner>,
}

impl Primitive {
    /// Creates a primitive with a fresh identity.
    pub fn new<F>(name: &str, eval: F) -> Self
    where
        F: Fn(&[&Array], &Attrs) -> AutodiffResult<Array> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PrimitiveInner {
                id: PrimitiveId(NEXT_PRIMITIVE.fetch_add(1, Ordering::Relaxed)),
                name: name.to_string(),
                eval: Arc::new(eval),
            }),
        }
    }

    /// Registry key.
    #[inline]
    pub fn id(&self) -> PrimitiveId {
        self.inner.id
    }

    /// Human-readable name used in errors and logs.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Runs the raw kernel with no interception.
    pub fn eval_raw(&self, args: &[&Array], attrs: &Attrs) -> AutodiffResult<Array> {
        (self.inner.eval)(args, attrs)
    }

    /// Calls the primitive, recording a node if any argument is traced.
    ///
    /// # Errors
    ///
    /// - `LevelLeak` if the innermost tracer's scope has already ended
    /// - `UnregisteredPrimitive` if a tracer reaches a primitive with no rules
    /// - any error from the raw kernel
    pub fn call(&self, args: &[Var], attrs: &Attrs) -> AutodiffResult<Var> {
        let Some(level) = args.iter().filter_map(Var::level).max() else {
            let raw: Vec<&Array> = args.iter().map(Var::array).collect();
            return Ok(Var::from(self.eval_raw(&raw, attrs)?));
        };
        if !context::is_active(level) {
            return Err(AutodiffError::LevelLeak { level });
        }
        let rules = registry::global()
            .lookup(self.id())
            .ok_or_else(|| AutodiffError::UnregisteredPrimitive {
                primitive: self.name().to_string(),
            })?;

        let mut parents = Vec::new();
        let unboxed: Vec<Var> = args
            .iter()
            .enumerate()
            .map(|(argnum, arg)| match arg {
                Var::Traced(tracer) if tracer.level() == level => {
                    parents.push((argnum, Rc::clone(tracer.node())));
                    tracer.value().clone()
                }
                other => other.clone(),
            })
            .collect();

        let value = self.call(&unboxed, attrs)?;
        let node = Node::record(
            level,
            self.clone(),
            rules,
            parents,
            unboxed,
            attrs.clone(),
            value,
        );
        tracing::trace!(
            primitive = self.name(),
            node = node.id().get(),
            level = %level,
            "recorded node"
        );
        Ok(Var::Traced(Tracer::new(node)))
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Primitive {}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("id", &self.inner.id.0)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Fetches argument `argnum` of a primitive call, reporting arity errors
/// against `op`.
pub(crate) fn arg<'a, T>(op: &str, args: &'a [T], argnum: usize) -> AutodiffResult<&'a T> {
    args.get(argnum).ok_or_else(|| {
        tracegrad_core::NumericError::ArityMismatch {
            op: op.to_string(),
            expected: argnum + 1,
            actual: args.len(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceScope;

    fn scale() -> Primitive {
        Primitive::new("scale_by_three", |args, _| {
            Ok(arg("scale_by_three", args, 0)?.map(|x| 3.0 * x))
        })
    }

    #[test]
    fn test_untraced_call_matches_raw_kernel() {
        let p = scale();
        let x = Array::vector(vec![1.0, -2.0]);
        let direct = p.eval_raw(&[&x], &Attrs::new()).unwrap();
        let called = p.call(&[Var::from(x)], &Attrs::new()).unwrap();
        assert!(!called.is_traced());
        assert_eq!(called.array(), &direct);
    }

    #[test]
    fn test_unregistered_primitive_on_tracer() {
        let p = scale();
        let scope = TraceScope::enter();
        let x = Var::Traced(Tracer::new(Node::root(Var::scalar(1.0), scope.level())));
        let err = p.call(&[x], &Attrs::new()).unwrap_err();
        assert_eq!(
            err,
            AutodiffError::UnregisteredPrimitive {
                primitive: "scale_by_three".to_string()
            }
        );
        // untraced calls of the same primitive are still fine
        assert!(p.call(&[Var::scalar(1.0)], &Attrs::new()).is_ok());
    }

    #[test]
    fn test_stale_tracer_is_a_level_leak() {
        let (x, level) = {
            let scope = TraceScope::enter();
            let x = Var::Traced(Tracer::new(Node::root(Var::scalar(1.0), scope.level())));
            (x, scope.level())
        };
        let err = crate::numpy::EXP.call(&[x], &Attrs::new()).unwrap_err();
        assert_eq!(err, AutodiffError::LevelLeak { level });
    }

    #[test]
    fn test_records_parents_for_innermost_level_only() {
        let outer = TraceScope::enter();
        let inner = TraceScope::enter();
        let a = Var::Traced(Tracer::new(Node::root(Var::scalar(2.0), outer.level())));
        let b = Var::Traced(Tracer::new(Node::root(Var::scalar(5.0), inner.level())));

        let out = crate::numpy::MUL.call(&[a.clone(), b], &Attrs::new()).unwrap();
        let tracer = out.as_tracer().unwrap();
        assert_eq!(tracer.level(), inner.level());
        assert_eq!(out.item().unwrap(), 10.0);

        let node = tracer.node();
        assert_eq!(node.parents().len(), 1);
        assert_eq!(node.parents()[0].argnum(), 1);
        assert!(node.parents()[0].node().id() < node.id());
        // the outer tracer is a constant here but its own level still sees
        // the product
        let (constant_pos, constant) = node.non_traced_args().next().unwrap();
        assert_eq!(constant_pos, 0);
        assert_eq!(constant.level(), Some(outer.level()));
        assert_eq!(node.value().level(), Some(outer.level()));
    }

    #[test]
    fn test_identity_survives_clone() {
        let p = scale();
        let q = p.clone();
        assert_eq!(p, q);
        assert_ne!(p, scale());
    }
}
