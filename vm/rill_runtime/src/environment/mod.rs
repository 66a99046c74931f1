//! Lexical scope chain with shadow protection.
//!
//! A `Scope` is one level of bindings plus a shared link to its parent;
//! `Environment` is the handle to the innermost scope of a chain. Parents
//! are shared, never owned: any number of child frames and closures may hang
//! off the same ancestor, and mutation through `set` goes through the shared
//! handle.
//!
//! The discipline that makes closures work:
//!
//! - `define` is declaration. When an ancestor already binds the name, the
//!   name is marked *protected* locally, so the new local slot shadows the
//!   ancestor instead of clobbering it.
//! - `set` is assignment. It overwrites a protected local slot, otherwise
//!   forwards to the nearest ancestor that owns the name, otherwise falls
//!   back to a local overwrite.
//! - `get` prefers a protected local slot, then the nearest ancestor
//!   binding, then the local map.

use rustc_hash::FxHashSet;

use crate::map::OrderedMap;
use crate::shared::Shared;
use crate::value::Value;

/// One level of name bindings.
#[derive(Debug, Default)]
pub struct Scope {
    /// Parent scope, shared with every other frame/closure built on it.
    parent: Option<Shared<Scope>>,
    /// Names this scope has locally shadowed.
    protected: FxHashSet<String>,
    /// This scope's own bindings.
    bindings: OrderedMap<String, Value>,
}

/// Walk up from `start`, returning the first scope whose own map binds
/// `name`.
fn nearest_owner(start: &Shared<Scope>, name: &str) -> Option<Shared<Scope>> {
    let mut cursor = start.clone();
    loop {
        let next = {
            let scope = cursor.borrow();
            if scope.bindings.contains_key(name) {
                return Some(cursor.clone());
            }
            scope.parent.clone()
        };
        cursor = next?;
    }
}

impl Scope {
    /// Root scope with no parent.
    pub fn new() -> Self {
        Scope::default()
    }

    /// Child scope over `parent`.
    pub fn with_parent(parent: Shared<Scope>) -> Self {
        Scope {
            parent: Some(parent),
            protected: FxHashSet::default(),
            bindings: OrderedMap::new(),
        }
    }

    /// Whether `name` is bound here or in any ancestor.
    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.borrow().has(name))
    }

    /// Nearest binding for `name`, searching this scope's own map first.
    fn find_binding(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        self.parent
            .as_ref()
            .and_then(|p| p.borrow().find_binding(name))
    }

    /// Nearest binding for `name` among ancestors only.
    fn ancestor_binding(&self, name: &str) -> Option<Value> {
        self.parent
            .as_ref()
            .and_then(|p| p.borrow().find_binding(name))
    }

    /// Whether any ancestor binds `name`.
    fn ancestor_has(&self, name: &str) -> bool {
        self.parent.as_ref().is_some_and(|p| p.borrow().has(name))
    }

    /// Resolve `name`: protected local slot first, then the nearest
    /// ancestor, then the local map.
    pub fn get(&self, name: &str) -> Option<Value> {
        if self.parent.is_some() {
            if self.protected.contains(name) {
                return self.bindings.get(name).cloned();
            }
            if let Some(value) = self.ancestor_binding(name) {
                return Some(value);
            }
        }
        self.bindings.get(name).cloned()
    }

    /// Declare `name` locally, shadow-protecting it when an ancestor
    /// already binds it.
    pub fn define(&mut self, name: String, value: Value) {
        if self.parent.is_some() && self.ancestor_has(&name) {
            self.protected.insert(name.clone());
        }
        self.bindings.insert(name, value);
    }

    /// Assign to `name`: protected slots stay local, otherwise the nearest
    /// owning ancestor takes the write, otherwise the write lands here.
    pub fn set(&mut self, name: &str, value: Value) {
        if self.parent.is_none() || self.protected.contains(name) {
            self.bindings.insert(name.to_owned(), value);
            return;
        }
        let owner = self
            .parent
            .as_ref()
            .and_then(|p| nearest_owner(p, name));
        match owner {
            Some(owner) => owner.borrow_mut().set(name, value),
            None => {
                self.bindings.insert(name.to_owned(), value);
            }
        }
    }

    /// Snapshot of this scope's own bindings, in key order.
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        self.bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Handle to the innermost scope of a chain.
///
/// Cloning the handle shares the scope; `dup` is the operation that grows
/// the chain (one fresh, empty child over the current scope). Both closure
/// capture and per-call frames are `dup`s.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    scope: Shared<Scope>,
}

impl Environment {
    /// Fresh environment with a single root scope.
    pub fn new() -> Self {
        Environment {
            scope: Shared::new(Scope::new()),
        }
    }

    /// New environment whose scope is an empty child of the current one.
    ///
    /// Ancestors are shared by reference, never copied.
    #[must_use]
    pub fn dup(&self) -> Self {
        Environment {
            scope: Shared::new(Scope::with_parent(self.scope.clone())),
        }
    }

    /// Resolve `name` through the chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scope.borrow().get(name)
    }

    /// Declare `name` in the innermost scope.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.scope.borrow_mut().define(name.into(), value);
    }

    /// Assign to `name` through the chain.
    pub fn set(&mut self, name: &str, value: Value) {
        self.scope.borrow_mut().set(name, value);
    }

    /// Whether `name` is bound anywhere in the chain.
    pub fn has(&self, name: &str) -> bool {
        self.scope.borrow().has(name)
    }

    /// Snapshot of the innermost scope's own bindings (trace hook).
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        self.scope.borrow().local_bindings()
    }
}
