//! Strand Reduce - recognition of associative reduction updates
//!
//! A reduction update such as `f(x) = f(x) + g(r)` can be split across
//! parallel lanes only if its operator is associative and has an identity.
//! This crate answers that question by matching updates against a table of
//! known associative patterns:
//!
//! - [`ops_table`]: the pattern table, keyed by element types, root node
//!   kind and tuple arity, populated lazily into an [`OpsTableCache`]
//! - [`associativity`]: unification of an update against the table,
//!   recovering the operator's identity and its `x`/`y` operands

pub mod associativity;
pub mod ops_table;

pub use associativity::{match_associative_op, AssociativeOp};
pub use ops_table::{
    get_ops_table, AssociativePattern, OpsTableCache, RootKind, TableKey, ValueBucket,
};
