//! Lexically scoped name bindings.
//!
//! A [`Scope`] maps names to a stack of values so inner bindings shadow outer
//! ones. Bindings are only introduced through [`Scoped::with_binding`], which
//! pops the frame when the body returns; a binding is visible for exactly the
//! lexical extent of its body.

use std::borrow::Borrow;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::Name;

/// Name to innermost-binding environment.
pub struct Scope<T> {
    frames: FxHashMap<Name, Vec<T>>,
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Scope {
            frames: FxHashMap::default(),
        }
    }
}

impl<T> Scope<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost binding of `name`.
    pub fn get<Q>(&self, name: &Q) -> Option<&T>
    where
        Name: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.frames.get(name).and_then(|stack| stack.last())
    }

    pub fn contains<Q>(&self, name: &Q) -> bool
    where
        Name: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn push(&mut self, name: Name, value: T) {
        self.frames.entry(name).or_default().push(value);
    }

    fn pop(&mut self, name: &Name) {
        let Some(stack) = self.frames.get_mut(name) else {
            crate::ir_bug!("pop of unbound name `{name}`");
        };
        stack.pop();
        if stack.is_empty() {
            self.frames.remove(name);
        }
    }
}

/// A traversal that carries a [`Scope`].
pub trait Scoped {
    type Binding;

    fn scope(&mut self) -> &mut Scope<Self::Binding>;

    /// Run `body` with `name` bound to `value`.
    fn with_binding<R>(
        &mut self,
        name: &Name,
        value: Self::Binding,
        body: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.scope().push(name.clone(), value);
        let result = body(self);
        self.scope().pop(name);
        result
    }
}
