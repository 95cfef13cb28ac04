//! Error taxonomy for IR passes.
//!
//! Two severities, no recovery path:
//!
//! - [`Severity::Internal`]: an invariant that an earlier pass must have
//!   guaranteed was violated. The message starts with
//!   `internal compiler error:` so drivers can file it as a compiler bug.
//! - [`Severity::User`]: malformed pipeline input that can be reported
//!   constructively. Compilation of that pipeline still stops.
//!
//! Node-construction invariants (operand types, lane counts) are not
//! reported through [`IrError`]; factories panic through [`ir_bug!`](crate::ir_bug)
//! because a badly typed node can only come from compiler code.

use crate::{Name, Type};

/// Classification of an [`IrError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Compiler bug: malformed input from an earlier pass.
    Internal,
    /// Usage error in the pipeline being compiled.
    User,
}

/// Failure raised by a lowering or analysis entry point.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// The associative-operator recognizer was called with no expressions.
    #[error("internal compiler error: associative-op lookup requires at least one expression")]
    EmptyReductionTuple,

    /// Tuple components of a reduction update have different types.
    #[error(
        "reduction tuple elements must all have the same type: element 0 is `{first}`, \
         element {index} is `{found}`"
    )]
    MismatchedTupleTypes {
        first: Type,
        index: usize,
        found: Type,
    },

    /// Two `Atomic` regions of one producer disagree on their
    /// synchronization metadata.
    #[error(
        "internal compiler error: atomic regions of producer `{producer}` disagree on \
         {field}: `{first}` vs `{second}`"
    )]
    InconsistentAtomic {
        producer: Name,
        field: &'static str,
        first: String,
        second: String,
    },

    /// A lock refers to a mutex array that no enclosing scope allocates.
    #[error(
        "internal compiler error: atomic region of `{producer}` locks mutex `{mutex}` \
         outside of any producer that allocates it"
    )]
    UnallocatedMutex { producer: Name, mutex: Name },

    /// The index written by an atomic update depends on the value being updated.
    #[error(
        "can't use atomic() on an update of `{producer}` where the index written to \
         depends on the current value of the Func"
    )]
    SelfReferentialAtomicIndex { producer: Name },

    /// Accumulator names do not line up with the update tuple.
    #[error(
        "internal compiler error: associativity check got {names} accumulator names for \
         a tuple of {exprs} expressions"
    )]
    PlaceholderArity { names: usize, exprs: usize },
}

impl IrError {
    /// Whether this is a compiler bug or a usage error.
    pub fn severity(&self) -> Severity {
        match self {
            IrError::MismatchedTupleTypes { .. } | IrError::SelfReferentialAtomicIndex { .. } => {
                Severity::User
            }
            IrError::EmptyReductionTuple
            | IrError::InconsistentAtomic { .. }
            | IrError::UnallocatedMutex { .. }
            | IrError::PlaceholderArity { .. } => Severity::Internal,
        }
    }

    /// Shorthand for `severity() == Severity::Internal`.
    pub fn is_internal(&self) -> bool {
        self.severity() == Severity::Internal
    }
}

/// Abort on a violated construction invariant.
///
/// Only for conditions that no user input can trigger.
#[macro_export]
macro_rules! ir_bug {
    ($($arg:tt)*) => {
        panic!("internal compiler error: {}", format_args!($($arg)*))
    };
}

/// `assert!` counterpart of [`ir_bug!`].
#[macro_export]
macro_rules! ir_assert {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::ir_bug!($($arg)*);
        }
    };
}
