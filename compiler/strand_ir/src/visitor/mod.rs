//! Read-only IR traversal.
//!
//! Override `visit_*` to act at a node and call the matching `walk_*` to
//! continue into its children. Children are reached through the `include_*`
//! hooks; a graph-aware visitor overrides those with a [`VisitedNodes`]
//! check so that a node shared by many parents is entered once.
//!
//! `walk_expr` and `walk_stmt` match every node kind without a wildcard arm,
//! so adding a kind is a compile error here until it is handled.
//!
//! # Example
//!
//! ```text
//! struct CountLoads {
//!     count: usize,
//!     visited: VisitedNodes,
//! }
//!
//! impl IrVisitor for CountLoads {
//!     fn visit_expr(&mut self, expr: &Expr) {
//!         if let ExprKind::Load { .. } = expr.kind() {
//!             self.count += 1;
//!         }
//!         walk_expr(self, expr);
//!     }
//!
//!     fn include_expr(&mut self, expr: &Expr) {
//!         if self.visited.first_visit_expr(expr) {
//!             self.visit_expr(expr);
//!         }
//!     }
//! }
//! ```

use rustc_hash::FxHashSet;

use crate::stack::ensure_sufficient_stack;
use crate::{Expr, ExprKind, Stmt, StmtKind};

/// IR visitor. The tree itself is never modified.
pub trait IrVisitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Entry point for each child expression.
    fn include_expr(&mut self, expr: &Expr) {
        self.visit_expr(expr);
    }

    /// Entry point for each child statement.
    fn include_stmt(&mut self, stmt: &Stmt) {
        self.visit_stmt(stmt);
    }
}

/// Visit the children of `expr` in field order.
pub fn walk_expr<V: IrVisitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    ensure_sufficient_stack(|| match expr.kind() {
        ExprKind::IntImm(_)
        | ExprKind::UIntImm(_)
        | ExprKind::FloatImm(_)
        | ExprKind::StringImm(_)
        | ExprKind::Variable(_) => {}
        ExprKind::Cast(value) | ExprKind::Not(value) | ExprKind::Broadcast { value, .. } => {
            visitor.include_expr(value);
        }
        ExprKind::Binary { a, b, .. } => {
            visitor.include_expr(a);
            visitor.include_expr(b);
        }
        ExprKind::Select {
            condition,
            true_value,
            false_value,
        } => {
            visitor.include_expr(condition);
            visitor.include_expr(true_value);
            visitor.include_expr(false_value);
        }
        ExprKind::Load {
            index, predicate, ..
        } => {
            visitor.include_expr(index);
            visitor.include_expr(predicate);
        }
        ExprKind::Ramp { base, stride, .. } => {
            visitor.include_expr(base);
            visitor.include_expr(stride);
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                visitor.include_expr(arg);
            }
        }
        ExprKind::Let { value, body, .. } => {
            visitor.include_expr(value);
            visitor.include_expr(body);
        }
    });
}

/// Visit the children of `stmt` in field order; `Block`s left to right.
pub fn walk_stmt<V: IrVisitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    ensure_sufficient_stack(|| match stmt.kind() {
        StmtKind::LetStmt { value, body, .. } => {
            visitor.include_expr(value);
            visitor.include_stmt(body);
        }
        StmtKind::AssertStmt { condition, message } => {
            visitor.include_expr(condition);
            visitor.include_expr(message);
        }
        StmtKind::ProducerConsumer { body, .. } => visitor.include_stmt(body),
        StmtKind::For {
            min, extent, body, ..
        } => {
            visitor.include_expr(min);
            visitor.include_expr(extent);
            visitor.include_stmt(body);
        }
        StmtKind::Store {
            value,
            index,
            predicate,
            ..
        } => {
            visitor.include_expr(value);
            visitor.include_expr(index);
            visitor.include_expr(predicate);
        }
        StmtKind::Allocate(alloc) => {
            for extent in &alloc.extents {
                visitor.include_expr(extent);
            }
            visitor.include_expr(&alloc.condition);
            if let Some(new_expr) = &alloc.new_expr {
                visitor.include_expr(new_expr);
            }
            visitor.include_stmt(&alloc.body);
        }
        StmtKind::Block { first, rest } => {
            visitor.include_stmt(first);
            visitor.include_stmt(rest);
        }
        StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        } => {
            visitor.include_expr(condition);
            visitor.include_stmt(then_case);
            if let Some(else_case) = else_case {
                visitor.include_stmt(else_case);
            }
        }
        StmtKind::Evaluate(value) => visitor.include_expr(value),
        StmtKind::Atomic(atomic) => {
            for index in &atomic.mutex_indices {
                visitor.include_expr(index);
            }
            visitor.include_stmt(&atomic.body);
        }
    });
}

/// Node identities already entered during one traversal.
///
/// Identities are addresses, so the set is only meaningful while the
/// traversed tree is alive; keep it scoped to a single walk.
#[derive(Default)]
pub struct VisitedNodes {
    exprs: FxHashSet<usize>,
    stmts: FxHashSet<usize>,
}

impl VisitedNodes {
    /// Record `expr`; `true` if it had not been seen.
    pub fn first_visit_expr(&mut self, expr: &Expr) -> bool {
        self.exprs.insert(expr.addr())
    }

    /// Record `stmt`; `true` if it had not been seen.
    pub fn first_visit_stmt(&mut self, stmt: &Stmt) -> bool {
        self.stmts.insert(stmt.addr())
    }

    pub fn len(&self) -> usize {
        self.exprs.len() + self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
