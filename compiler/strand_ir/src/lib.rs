//! Strand IR - the lowering compiler's intermediate representation
//!
//! This crate contains the IR and the generic machinery every pass uses:
//! - `Name` and `Type` for identifiers and value types
//! - `Expr` and `Stmt`, immutable refcounted nodes built through checking
//!   factories
//! - Visitor and mutator traversal, with graph-aware variants
//! - Structural comparison (`equal`, `graph_equal`, `ExprKey`)
//! - Pattern matching with wildcards (`expr_match`)
//! - The `IrError` taxonomy shared by all passes
//!
//! # Design Philosophy
//!
//! - **Share, never mutate**: nodes are `Arc` handles; a rewrite builds new
//!   nodes and reuses every unchanged subtree.
//! - **Identity is cheap**: `same_as` is a pointer comparison and implies
//!   structural equality.
//! - **Exhaustive dispatch**: walks and comparisons match every node kind
//!   without a wildcard arm.

/// Compile-time assertion that a type has a specific size.
///
/// Node handles are copied into every parent; keep them pointer sized.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod equality;
mod error;
mod expr;
pub mod ir_match;
pub mod mutator;
mod name;
mod node_kind;
pub mod op;
mod printer;
pub mod scope;
pub mod stack;
mod stmt;
mod types;
pub mod visitor;

pub use equality::{
    deep_compare, equal, graph_equal, graph_stmt_equal, stmt_equal, ExprKey, IrCompareCache,
    IrComparer,
};
pub use error::{IrError, Severity};
pub use expr::{BinaryOp, CallArgs, CallType, Expr, ExprKind, ExprNode};
pub use ir_match::{expr_match, Bindings};
pub use mutator::{
    mutate_expr_children, mutate_stmt_children, substitute, substitute_in_stmt, GraphMemo,
    IrMutator, Substitute,
};
pub use name::Name;
pub use node_kind::NodeKind;
pub use scope::{Scope, Scoped};
pub use stmt::{Allocate, Atomic, ForType, MemoryType, Stmt, StmtKind};
pub use types::{Type, TypeCode};
pub use visitor::{walk_expr, walk_stmt, IrVisitor, VisitedNodes};

static_assert_size!(Expr, 8);
static_assert_size!(Option<Expr>, 8);
static_assert_size!(Stmt, 8);
static_assert_size!(Name, 16);
