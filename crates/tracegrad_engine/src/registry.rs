//! Primitive registry: derivative rules keyed by primitive identity.
//!
//! Each primitive has at most one [`PrimitiveRules`] entry holding an
//! optional reverse-mode rule ([`VjpRule`]) and an optional forward-mode
//! rule ([`JvpRule`]). Rules are attached with [`defvjp`], [`defvjp_argnum`],
//! [`defjvp`], [`defjvp_argnum`] and [`def_linear`].
//!
//! # Rule shapes
//!
//! A VJP maker receives the primitive's output `ans`, its positional
//! arguments and its attributes, and returns a function from an output
//! cotangent to the cotangent of one argument. A JVP function maps an input
//! tangent directly to the output tangent.
//!
//! All rules should be written with traced operations from
//! [`crate::numpy`] so that higher-order derivatives flow through them.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tracegrad_core::Attrs;
//! use tracegrad_engine::registry::{self, VjpFn, VjpMaker};
//! use tracegrad_engine::{grad, Primitive, Var};
//!
//! // cube(x) = x^3 with a hand-written reverse rule
//! let cube = Primitive::new("cube", |args, _| Ok(args[0].map(|x| x * x * x)));
//! let maker: VjpMaker = Arc::new(|_ans: &Var, args: &[Var], _: &Attrs| {
//!     let x = args[0].clone();
//!     let rule: VjpFn = Box::new(move |g: &Var| g.mul(&x.square()?)?.mul(&Var::scalar(3.0)));
//!     Ok(rule)
//! });
//! registry::defvjp(&cube, vec![Some(maker)]);
//!
//! let df = grad(move |x: &Var| cube.call(&[x.clone()], &Attrs::new()));
//! assert_eq!(df(&Var::scalar(2.0)).unwrap().item().unwrap(), 12.0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracegrad_core::Attrs;

use crate::error::{AutodiffError, AutodiffResult};
use crate::primitive::{Primitive, PrimitiveId};
use crate::tracer::Var;

/// Output-cotangent to argument-cotangent map produced by a [`VjpMaker`].
pub type VjpFn = Box<dyn Fn(&Var) -> AutodiffResult<Var>>;

/// Builds the VJP for one argument position: `(ans, args, attrs)`.
pub type VjpMaker = Arc<dyn Fn(&Var, &[Var], &Attrs) -> AutodiffResult<VjpFn> + Send + Sync>;

/// Builds the VJP for any argument position: `(argnum, ans, args, attrs)`.
pub type VjpArgnumMaker =
    Arc<dyn Fn(usize, &Var, &[Var], &Attrs) -> AutodiffResult<VjpFn> + Send + Sync>;

/// Output tangent for one argument position: `(g, ans, args, attrs)`.
pub type JvpFn = Arc<dyn Fn(&Var, &Var, &[Var], &Attrs) -> AutodiffResult<Var> + Send + Sync>;

/// Output tangent for any argument position: `(argnum, g, ans, args, attrs)`.
pub type JvpArgnumFn =
    Arc<dyn Fn(usize, &Var, &Var, &[Var], &Attrs) -> AutodiffResult<Var> + Send + Sync>;

/// Reverse-mode rule of a primitive.
#[derive(Clone)]
pub enum VjpRule {
    /// One maker per argument position; `None` marks a non-differentiable one.
    PerArgument(Vec<Option<VjpMaker>>),
    /// A single maker taking the argument position, for variadic primitives.
    AnyArgument(VjpArgnumMaker),
}

/// Forward-mode rule of a primitive.
#[derive(Clone)]
pub enum JvpRule {
    /// One rule per argument position; `None` marks a non-differentiable one.
    PerArgument(Vec<Option<JvpFn>>),
    /// A single rule taking the argument position.
    AnyArgument(JvpArgnumFn),
    /// The primitive is linear in each argument: the tangent is the
    /// primitive itself applied with the tangent substituted.
    Linear,
}

/// Derivative rules registered for one primitive.
#[derive(Clone, Default)]
pub struct PrimitiveRules {
    vjp: Option<VjpRule>,
    jvp: Option<JvpRule>,
}

impl PrimitiveRules {
    /// Whether a reverse-mode rule is present.
    pub fn has_vjp(&self) -> bool {
        self.vjp.is_some()
    }

    /// Whether a forward-mode rule is present.
    pub fn has_jvp(&self) -> bool {
        self.jvp.is_some()
    }

    /// Builds the VJP of `primitive` with respect to argument `argnum`.
    pub(crate) fn make_vjp(
        &self,
        primitive: &Primitive,
        argnum: usize,
        ans: &Var,
        args: &[Var],
        attrs: &Attrs,
    ) -> AutodiffResult<VjpFn> {
        let maker = match &self.vjp {
            Some(VjpRule::PerArgument(makers)) => makers.get(argnum).and_then(Option::as_ref),
            Some(VjpRule::AnyArgument(maker)) => return maker(argnum, ans, args, attrs),
            None => None,
        };
        match maker {
            Some(maker) => maker(ans, args, attrs),
            None => Err(non_differentiable(primitive, argnum, "reverse")),
        }
    }

    /// Tangent of `primitive`'s output given tangent `g` for argument `argnum`.
    pub(crate) fn apply_jvp(
        &self,
        primitive: &Primitive,
        argnum: usize,
        g: &Var,
        ans: &Var,
        args: &[Var],
        attrs: &Attrs,
    ) -> AutodiffResult<Var> {
        match &self.jvp {
            Some(JvpRule::PerArgument(rules)) => match rules.get(argnum).and_then(Option::as_ref) {
                Some(rule) => rule(g, ans, args, attrs),
                None => Err(non_differentiable(primitive, argnum, "forward")),
            },
            Some(JvpRule::AnyArgument(rule)) => rule(argnum, g, ans, args, attrs),
            Some(JvpRule::Linear) => {
                let mut substituted = args.to_vec();
                match substituted.get_mut(argnum) {
                    Some(slot) => *slot = g.clone(),
                    None => return Err(non_differentiable(primitive, argnum, "forward")),
                }
                primitive.call(&substituted, attrs)
            }
            None => Err(non_differentiable(primitive, argnum, "forward")),
        }
    }
}

impl fmt::Debug for PrimitiveRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vjp = match &self.vjp {
            Some(VjpRule::PerArgument(makers)) => format!(
                "per-argument {:?}",
                makers.iter().map(Option::is_some).collect::<Vec<_>>()
            ),
            Some(VjpRule::AnyArgument(_)) => "any-argument".to_string(),
            None => "none".to_string(),
        };
        let jvp = match &self.jvp {
            Some(JvpRule::PerArgument(rules)) => format!(
                "per-argument {:?}",
                rules.iter().map(Option::is_some).collect::<Vec<_>>()
            ),
            Some(JvpRule::AnyArgument(_)) => "any-argument".to_string(),
            Some(JvpRule::Linear) => "linear".to_string(),
            None => "none".to_string(),
        };
        f.debug_struct("PrimitiveRules")
            .field("vjp", &vjp)
            .field("jvp", &jvp)
            .finish()
    }
}

fn non_differentiable(primitive: &Primitive, argnum: usize, mode: &'static str) -> AutodiffError {
    AutodiffError::NonDifferentiableArgument {
        primitive: primitive.name().to_string(),
        argnum,
        mode,
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Process-wide table of derivative rules.
///
/// Entries are stored behind `Arc` and replaced wholesale on update, so a
/// node that captured its rules at creation keeps a consistent snapshot.
pub struct Registry {
    entries: RwLock<HashMap<PrimitiveId, Arc<PrimitiveRules>>>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new();
    crate::numpy::rules::install(&registry);
    registry
});

/// The global registry, populated with the built-in rules on first use.
pub fn global() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn update(&self, primitive: &Primitive, what: &str, apply: impl FnOnce(&mut PrimitiveRules)) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let slot = entries.entry(primitive.id()).or_default();
        let mut rules = PrimitiveRules::clone(slot);
        let replaced = match what {
            "vjp" => rules.vjp.is_some(),
            _ => rules.jvp.is_some(),
        };
        apply(&mut rules);
        *slot = Arc::new(rules);
        if replaced {
            tracing::debug!(primitive = primitive.name(), rule = what, "replaced derivative rule");
        } else {
            tracing::debug!(primitive = primitive.name(), rule = what, "registered derivative rule");
        }
    }

    /// Sets per-position VJP makers for `primitive`.
    pub fn defvjp(&self, primitive: &Primitive, makers: Vec<Option<VjpMaker>>) {
        self.update(primitive, "vjp", |rules| {
            rules.vjp = Some(VjpRule::PerArgument(makers))
        });
    }

    /// Sets one VJP maker covering every position of `primitive`.
    pub fn defvjp_argnum(&self, primitive: &Primitive, maker: VjpArgnumMaker) {
        self.update(primitive, "vjp", |rules| {
            rules.vjp = Some(VjpRule::AnyArgument(maker))
        });
    }

    /// Sets per-position JVP rules for `primitive`.
    pub fn defjvp(&self, primitive: &Primitive, rules: Vec<Option<JvpFn>>) {
        self.update(primitive, "jvp", |entry| {
            entry.jvp = Some(JvpRule::PerArgument(rules))
        });
    }

    /// Sets one JVP rule covering every position of `primitive`.
    pub fn defjvp_argnum(&self, primitive: &Primitive, rule: JvpArgnumFn) {
        self.update(primitive, "jvp", |entry| {
            entry.jvp = Some(JvpRule::AnyArgument(rule))
        });
    }

    /// Declares `primitive` linear in each argument for forward mode.
    pub fn def_linear(&self, primitive: &Primitive) {
        self.update(primitive, "jvp", |entry| entry.jvp = Some(JvpRule::Linear));
    }

    /// Current rules for a primitive, if any were registered.
    pub fn lookup(&self, id: PrimitiveId) -> Option<Arc<PrimitiveRules>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Drops every rule registered for a primitive.
    pub fn remove(&self, id: PrimitiveId) -> Option<Arc<PrimitiveRules>> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            tracing::debug!(?id, "removed derivative rules");
        }
        removed
    }

    /// Number of primitives with an entry.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no primitive has an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registers per-position VJP makers in the global registry.
pub fn defvjp(primitive: &Primitive, makers: Vec<Option<VjpMaker>>) {
    global().defvjp(primitive, makers);
}

/// Registers an argnum-generic VJP maker in the global registry.
pub fn defvjp_argnum(primitive: &Primitive, maker: VjpArgnumMaker) {
    global().defvjp_argnum(primitive, maker);
}

/// Registers per-position JVP rules in the global registry.
pub fn defjvp(primitive: &Primitive, rules: Vec<Option<JvpFn>>) {
    global().defjvp(primitive, rules);
}

/// Registers an argnum-generic JVP rule in the global registry.
pub fn defjvp_argnum(primitive: &Primitive, rule: JvpArgnumFn) {
    global().defjvp_argnum(primitive, rule);
}

/// Declares `primitive` linear in the global registry.
pub fn def_linear(primitive: &Primitive) {
    global().def_linear(primitive);
}

/// Removes a primitive's rules from the global registry.
pub fn remove(primitive: &Primitive) -> Option<Arc<PrimitiveRules>> {
    global().remove(primitive.id())
}

/// Looks up a primitive's rules in the global registry.
pub fn lookup(primitive: &Primitive) -> Option<Arc<PrimitiveRules>> {
    global().lookup(primitive.id())
}
