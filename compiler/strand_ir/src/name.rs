//! Shared identifier for variables, buffers, functions and mutexes.
//!
//! Lowering synthesizes a lot of dotted names (`f.0`, `f.min.1`,
//! `f.mutex.stride.0`), so names are owned strings behind a shared pointer:
//! cloning is a refcount bump and the text is always available for printing
//! without a side table.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Immutable, cheaply clonable identifier.
///
/// Equality, ordering and hashing are by string content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Arc<str>);

impl Name {
    /// The empty name. An `Atomic` with an empty mutex name needs no lock.
    pub const EMPTY: &'static str = "";

    /// Create a name from its text.
    #[inline]
    pub fn new(text: &str) -> Self {
        Name(Arc::from(text))
    }

    /// The empty name as a value.
    #[inline]
    pub fn empty() -> Self {
        Name::new(Self::EMPTY)
    }

    /// Whether this is the empty name.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `self == prefix` or `self` starts with `prefix.`.
    ///
    /// Tuple components and buffer metadata live in the dotted namespace of
    /// their owner (`f.0`, `f.extent.2`).
    pub fn is_in_namespace_of(&self, prefix: &str) -> bool {
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }

    /// Append a dotted suffix: `f` + `min.0` -> `f.min.0`.
    pub fn child(&self, suffix: impl fmt::Display) -> Name {
        Name::new(&format!("{}.{suffix}", self.0))
    }
}

impl Default for Name {
    fn default() -> Self {
        Name::empty()
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl From<String> for Name {
    fn from(text: String) -> Self {
        Name(Arc::from(text))
    }
}

impl From<&Name> for Name {
    fn from(name: &Name) -> Self {
        name.clone()
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_membership() {
        let n = Name::new("f.0");
        assert!(n.is_in_namespace_of("f"));
        assert!(!n.is_in_namespace_of("f.1"));
        assert!(!Name::new("fg").is_in_namespace_of("f"));
        assert!(Name::new("f").is_in_namespace_of("f"));
    }

    #[test]
    fn child_names() {
        assert_eq!(Name::new("f").child("extent.1"), "f.extent.1");
        assert_eq!(Name::new("acc.mutex").child(0), "acc.mutex.0");
    }

    #[test]
    fn empty_name() {
        assert!(Name::empty().is_empty());
        assert!(Name::default().is_empty());
        assert!(!Name::new("m").is_empty());
    }
}
