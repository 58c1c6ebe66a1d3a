//! Trace context stack: nesting levels for differentiation contexts.
//!
//! Every differential operator enters a [`TraceScope`] before running the
//! user function and leaves it when the scope is dropped, including on the
//! error path. Levels come from a process-wide counter and are never reused,
//! so a tracer that escapes its scope can always be recognised as stale.
//!
//! # Threading
//!
//! Level issuance is a single atomic increment. The stack of *active* levels
//! is thread-local: a graph built on one thread never crosses to another
//! (values are `Rc`-based), so each thread only needs to know its own scopes.
//!
//! # Example
//!
//! ```rust
//! use tracegrad_engine::context::{self, TraceScope};
//!
//! assert_eq!(context::current_level(), None);
//! {
//!     let outer = TraceScope::enter();
//!     let inner = TraceScope::enter();
//!     assert!(inner.level() > outer.level());
//!     assert_eq!(context::current_level(), Some(inner.level()));
//! }
//! assert_eq!(context::depth(), 0);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one differentiation context.
///
/// Larger levels belong to more deeply nested contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u64);

impl Level {
    /// Raw counter value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

static NEXT_LEVEL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE: RefCell<Vec<Level>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard for one active nesting level.
///
/// Dropping the guard retires the level. Guards are not `Send`: a level is
/// only meaningful on the thread that entered it.
#[derive(Debug)]
pub struct TraceScope {
    level: Level,
    _not_send: PhantomData<Rc<()>>,
}

impl TraceScope {
    /// Allocates a fresh level and pushes it onto this thread's stack.
    pub fn enter() -> Self {
        let level = Level(NEXT_LEVEL.fetch_add(1, Ordering::Relaxed));
        ACTIVE.with(|stack| stack.borrow_mut().push(level));
        tracing::trace!(level = %level, "entered trace scope");
        Self {
            level,
            _not_send: PhantomData,
        }
    }

    /// Level owned by this scope.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        let level = self.level;
        ACTIVE.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.last() == Some(&level) {
                stack.pop();
            } else {
                tracing::error!(level = %level, "trace scope released out of order");
                stack.retain(|active| *active != level);
            }
        });
        tracing::trace!(level = %level, "left trace scope");
    }
}

/// Whether `level` belongs to a scope that is still open on this thread.
pub fn is_active(level: Level) -> bool {
    ACTIVE.with(|stack| stack.borrow().iter().rev().any(|active| *active == level))
}

/// Innermost open level on this thread.
pub fn current_level() -> Option<Level> {
    ACTIVE.with(|stack| stack.borrow().last().copied())
}

/// Number of open scopes on this thread.
pub fn depth() -> usize {
    ACTIVE.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_strictly_increase() {
        let a = TraceScope::enter();
        let b = TraceScope::enter();
        let retired = b.level();
        drop(b);
        let c = TraceScope::enter();
        assert!(retired > a.level());
        // a retired level is never handed out again
        assert!(c.level() > retired);
    }

    #[test]
    fn test_scope_pops_on_drop() {
        let before = depth();
        {
            let scope = TraceScope::enter();
            assert!(is_active(scope.level()));
            assert_eq!(depth(), before + 1);
        }
        assert_eq!(depth(), before);
    }

    #[test]
    fn test_retired_level_is_inactive() {
        let level = {
            let scope = TraceScope::enter();
            scope.level()
        };
        assert!(!is_active(level));
    }

    #[test]
    fn test_scope_pops_when_closure_fails() {
        fn failing() -> Result<(), String> {
            let _scope = TraceScope::enter();
            Err("user function failed".to_string())
        }
        let before = depth();
        assert!(failing().is_err());
        assert_eq!(depth(), before);
    }

    #[test]
    fn test_out_of_order_release_still_removes_level() {
        let outer = TraceScope::enter();
        let inner = TraceScope::enter();
        let (outer_level, inner_level) = (outer.level(), inner.level());
        drop(outer);
        assert!(!is_active(outer_level));
        assert!(is_active(inner_level));
        drop(inner);
        assert!(!is_active(inner_level));
    }

    #[test]
    fn test_display() {
        let scope = TraceScope::enter();
        assert_eq!(format!("{}", scope.level()), format!("L{}", scope.level().get()));
    }
}
