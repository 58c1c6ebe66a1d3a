//! # tracegrad_engine: Tracing Automatic Differentiation (Layer 2)
//!
//! ## Layer 2 Role
//!
//! tracegrad_engine turns ordinary numeric functions into their derivatives
//! by recording the primitive operations they perform on boxed values:
//! - Trace levels and scoped nesting (`context`)
//! - Boxed values and recorded operations (`tracer`, `node`)
//! - Primitives and the derivative rule registry (`primitive`, `registry`)
//! - Reverse and forward propagation over recorded graphs (`reverse`, `forward`)
//! - Differentiable array operations with rules (`numpy`)
//! - User-facing operators such as `grad`, `jacobian`, `hessian` (`differential`)
//! - Nested containers and flattening (`container`)
//! - Recomputation checkpoints (`checkpoint`)
//! - Finite-difference derivative checks (`gradcheck`)
//!
//! Functions are written once against [`Var`] and run unchanged on plain
//! values or tracers. Nothing is compiled or transformed ahead of time: each
//! call of a differential operator runs the function and records exactly the
//! operations that executed, so data-dependent control flow is supported.
//!
//! ## Nesting
//!
//! Every operator opens a fresh trace level. Operators compose to arbitrary
//! depth, and perturbations from different levels never mix.
//!
//! ## Usage Examples
//!
//! ```rust
//! use tracegrad_engine::{grad, hessian, jacobian, jvp, vjp, Var};
//!
//! let f = |x: &Var| x.tanh()?.mul(x)?.sum();
//! let x = Var::vector(vec![0.5, -1.0]);
//!
//! let g = grad(f)(&x).unwrap();
//! assert_eq!(g.shape(), &[2]);
//!
//! let h = hessian(f)(&x).unwrap();
//! assert_eq!(h.shape(), &[2, 2]);
//!
//! let j = jacobian(|x: &Var| x.exp())(&x).unwrap();
//! assert_eq!(j.shape(), &[2, 2]);
//!
//! let (_, tangent) = jvp(|x: &Var| x.sin(), &Var::scalar(0.0), &Var::scalar(1.0)).unwrap();
//! assert_eq!(tangent.item().unwrap(), 1.0);
//!
//! let (_, pullback) = vjp(|x: &Var| x.square(), &Var::scalar(3.0)).unwrap();
//! assert_eq!(pullback.call(&Var::scalar(1.0)).unwrap().item().unwrap(), 6.0);
//! ```
//!
//! Container-shaped parameters:
//!
//! ```rust
//! use tracegrad_engine::container::Tree;
//! use tracegrad_engine::{grad_tree, Var};
//!
//! let params = Tree::dict(vec![("a", Tree::leaf(2.0)), ("b", Tree::leaf(3.0))]);
//! let f = |t: &Tree| t.get("a").and_then(Tree::as_leaf).unwrap().mul(t.get("b").and_then(Tree::as_leaf).unwrap());
//! let g = grad_tree(f)(&params).unwrap();
//! assert_eq!(g.get("a").and_then(Tree::as_leaf).unwrap().item().unwrap(), 3.0);
//! ```
//!
//! New primitives are registered through [`registry`]; see [`Primitive`].
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialisation for the underlying arrays

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod checkpoint;
pub mod container;
pub mod context;
pub mod differential;
pub mod error;
pub mod forward;
pub mod gradcheck;
pub mod node;
pub mod numpy;
pub mod primitive;
pub mod registry;
pub mod reverse;
pub mod tracer;

pub use differential::{
    deriv, elementwise_grad, grad, grad_and_aux, grad_argnum, grad_named, grad_tree,
    half_sum_of_squares, hessian, hessian_tensor_product, hessian_vector_product, jacobian,
    jacobian_tree, jvp, make_ggnvp, make_hvp, make_jvp, multigrad_dict,
    tensor_jacobian_product, value_and_grad, value_and_grad_and_aux, value_and_grad_tree,
    vector_jacobian_product, vjp, Ggnvp, Pullback, Pushforward,
};
pub use error::{AutodiffError, AutodiffResult};
pub use primitive::Primitive;
pub use tracer::{Tracer, Var};

pub use tracegrad_core::{Array, Attrs};
