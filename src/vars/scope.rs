//! Lexical variable scopes.
//!
//! Scopes form a chain from the task being executed up to the run's root
//! variables:
//!
//! ```text
//! Root (environment vars, --set overrides)
//!   └── Play FutureScope (play vars, vars_files, registered results, futures)
//!         └── Module / item NestedScope (call arguments, `item`)
//!               └── PriorityScope (include vars, checked first)
//! ```
//!
//! Lookups walk towards the root; writes always land in the scope they are
//! issued against, so a child can shadow but never clobber an ancestor.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::expr::{Value, Vars};

/// A variable environment.
///
/// Scopes are shared between the control thread and future worker threads,
/// hence `Send + Sync` and `&self` mutation.
pub trait Scope: Send + Sync {
    /// Looks up a variable, walking parent scopes on a miss.
    fn get(&self, key: &str) -> Option<Value>;

    /// Binds a variable in this scope.
    fn set(&self, key: &str, value: Value);

    /// Binds every entry of `vars` in this scope.
    fn extend(&self, vars: &Vars) {
        for (key, value) in vars {
            self.set(key, value.clone());
        }
    }
}

impl<S: Scope + ?Sized> Scope for Arc<S> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) {
        (**self).set(key, value)
    }
}

/// A scope with its own variable table and an optional parent.
#[derive(Default)]
pub struct NestedScope {
    parent: Option<Arc<dyn Scope>>,
    vars: RwLock<Vars>,
}

impl NestedScope {
    /// Creates a root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child of `parent`.
    pub fn with_parent(parent: Arc<dyn Scope>) -> Self {
        Self {
            parent: Some(parent),
            vars: RwLock::new(Vars::new()),
        }
    }

    /// Creates a root scope holding `vars`.
    pub fn from_vars(vars: Vars) -> Self {
        Self {
            parent: None,
            vars: RwLock::new(vars),
        }
    }

    /// Returns a copy of this scope's own variables, excluding ancestors.
    pub fn local(&self) -> Vars {
        self.vars.read().clone()
    }

    /// Returns true if `key` is bound in this scope itself.
    pub fn contains_local(&self, key: &str) -> bool {
        self.vars.read().contains_key(key)
    }
}

impl Scope for NestedScope {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.vars.read().get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(key))
    }

    fn set(&self, key: &str, value: Value) {
        self.vars.write().insert(key.to_string(), value);
    }
}

/// A fixed override table consulted before a wrapped scope.
///
/// Writes go through to the wrapped scope; the overrides are read-only.
pub struct PriorityScope {
    overrides: Vars,
    rest: Arc<dyn Scope>,
}

impl PriorityScope {
    pub fn new(overrides: Vars, rest: Arc<dyn Scope>) -> Self {
        Self { overrides, rest }
    }
}

impl Scope for PriorityScope {
    fn get(&self, key: &str) -> Option<Value> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| self.rest.get(key))
    }

    fn set(&self, key: &str, value: Value) {
        self.rest.set(key, value)
    }
}
