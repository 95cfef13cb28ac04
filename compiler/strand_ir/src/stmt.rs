//! Statement nodes.
//!
//! Same ownership model as [`Expr`]: a [`Stmt`] is a shared handle to an
//! immutable [`StmtKind`], built only through checking factories.

use std::sync::Arc;

use crate::{ir_assert, ir_bug, op, Expr, Name, NodeKind, Type};

/// Loop execution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForType {
    Serial,
    /// Iterations may run concurrently on different threads.
    Parallel,
    Vectorized,
    Unrolled,
}

/// Where an allocation lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryType {
    Auto,
    Heap,
    Stack,
    Register,
}

/// A scoped buffer allocation.
///
/// The buffer lives for the extent of `body`. When `new_expr` is set, it
/// produces the storage instead of the default allocator, and
/// `free_function` is called on every exit path from `body`.
#[derive(Clone)]
pub struct Allocate {
    pub name: Name,
    pub ty: Type,
    pub memory_type: MemoryType,
    pub extents: Vec<Expr>,
    pub condition: Expr,
    pub body: Stmt,
    pub new_expr: Option<Expr>,
    pub free_function: Option<Name>,
}

/// A reduction update that may need mutual exclusion across parallel lanes.
///
/// All `Atomic` regions with the same `producer_name` form one
/// synchronization domain and must agree on `mutex_name`, `tuple_size` and
/// `dimensions`.
#[derive(Clone)]
pub struct Atomic {
    pub producer_name: Name,
    /// Mutex array guarding the producer; empty if no lock is required.
    pub mutex_name: Name,
    /// Element of the mutex array to lock. Empty or more than one entry
    /// means a single mutex guards the whole buffer.
    pub mutex_indices: Vec<Expr>,
    /// Number of tuple components of the producer.
    pub tuple_size: usize,
    /// Dimensionality of the producer's buffer.
    pub dimensions: usize,
    pub body: Stmt,
}

impl Atomic {
    /// Whether this region still requires a lock.
    pub fn needs_mutex(&self) -> bool {
        !self.mutex_name.is_empty()
    }
}

/// Payload of a statement node.
#[derive(Clone)]
pub enum StmtKind {
    LetStmt {
        name: Name,
        value: Expr,
        body: Stmt,
    },
    AssertStmt {
        condition: Expr,
        message: Expr,
    },
    /// Scope in which `name` is computed (`is_producer`) or used.
    ProducerConsumer {
        name: Name,
        is_producer: bool,
        body: Stmt,
    },
    For {
        name: Name,
        min: Expr,
        extent: Expr,
        for_type: ForType,
        body: Stmt,
    },
    /// Write `value` to `name[index]` where `predicate` holds.
    Store {
        name: Name,
        value: Expr,
        index: Expr,
        predicate: Expr,
    },
    Allocate(Allocate),
    /// `first` then `rest`, strictly in that order.
    Block {
        first: Stmt,
        rest: Stmt,
    },
    IfThenElse {
        condition: Expr,
        then_case: Stmt,
        else_case: Option<Stmt>,
    },
    /// Evaluate an expression for its side effects.
    Evaluate(Expr),
    Atomic(Atomic),
}

/// Shared handle to an immutable statement node.
#[derive(Clone)]
pub struct Stmt(Arc<StmtKind>);

impl Stmt {
    fn make(kind: StmtKind) -> Self {
        Stmt(Arc::new(kind))
    }

    #[inline]
    pub fn kind(&self) -> &StmtKind {
        &self.0
    }

    /// Reference identity. Implies structural equality; O(1).
    #[inline]
    pub fn same_as(&self, other: &Stmt) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn node_kind(&self) -> NodeKind {
        match self.kind() {
            StmtKind::LetStmt { .. } => NodeKind::LetStmt,
            StmtKind::AssertStmt { .. } => NodeKind::AssertStmt,
            StmtKind::ProducerConsumer { .. } => NodeKind::ProducerConsumer,
            StmtKind::For { .. } => NodeKind::For,
            StmtKind::Store { .. } => NodeKind::Store,
            StmtKind::Allocate(_) => NodeKind::Allocate,
            StmtKind::Block { .. } => NodeKind::Block,
            StmtKind::IfThenElse { .. } => NodeKind::IfThenElse,
            StmtKind::Evaluate(_) => NodeKind::Evaluate,
            StmtKind::Atomic(_) => NodeKind::Atomic,
        }
    }

    /// The `Atomic` payload, if this is an atomic region.
    pub fn as_atomic(&self) -> Option<&Atomic> {
        match self.kind() {
            StmtKind::Atomic(atomic) => Some(atomic),
            _ => None,
        }
    }

    /// The `Allocate` payload, if this is an allocation.
    pub fn as_allocate(&self) -> Option<&Allocate> {
        match self.kind() {
            StmtKind::Allocate(alloc) => Some(alloc),
            _ => None,
        }
    }

    // ── Factories ───────────────────────────────────────────────────

    pub fn let_stmt(name: impl Into<Name>, value: Expr, body: Stmt) -> Self {
        Stmt::make(StmtKind::LetStmt {
            name: name.into(),
            value,
            body,
        })
    }

    pub fn assert_stmt(condition: Expr, message: Expr) -> Self {
        ir_assert!(
            condition.ty().is_bool() && condition.ty().is_scalar(),
            "AssertStmt condition has type {}",
            condition.ty()
        );
        Stmt::make(StmtKind::AssertStmt { condition, message })
    }

    pub fn producer_consumer(name: impl Into<Name>, is_producer: bool, body: Stmt) -> Self {
        Stmt::make(StmtKind::ProducerConsumer {
            name: name.into(),
            is_producer,
            body,
        })
    }

    pub fn producer(name: impl Into<Name>, body: Stmt) -> Self {
        Stmt::producer_consumer(name, true, body)
    }

    pub fn consumer(name: impl Into<Name>, body: Stmt) -> Self {
        Stmt::producer_consumer(name, false, body)
    }

    pub fn for_loop(
        name: impl Into<Name>,
        min: Expr,
        extent: Expr,
        for_type: ForType,
        body: Stmt,
    ) -> Self {
        ir_assert!(
            min.ty().is_scalar() && min.ty() == extent.ty() && min.ty().is_integral(),
            "For bounds have types {} and {}",
            min.ty(),
            extent.ty()
        );
        Stmt::make(StmtKind::For {
            name: name.into(),
            min,
            extent,
            for_type,
            body,
        })
    }

    /// Unpredicated store of `value` to `name[index]`.
    pub fn store(name: impl Into<Name>, value: Expr, index: Expr) -> Self {
        let predicate = op::const_true(value.ty().lanes());
        Stmt::store_predicated(name, value, index, predicate)
    }

    pub fn store_predicated(
        name: impl Into<Name>,
        value: Expr,
        index: Expr,
        predicate: Expr,
    ) -> Self {
        ir_assert!(
            index.ty().is_integral(),
            "Store index has non-integer type {}",
            index.ty()
        );
        ir_assert!(
            index.ty().lanes() == value.ty().lanes()
                && predicate.ty().lanes() == value.ty().lanes(),
            "Store of {} with index {} and predicate {}",
            value.ty(),
            index.ty(),
            predicate.ty()
        );
        ir_assert!(
            predicate.ty().is_bool(),
            "Store predicate has non-boolean type {}",
            predicate.ty()
        );
        Stmt::make(StmtKind::Store {
            name: name.into(),
            value,
            index,
            predicate,
        })
    }

    pub fn allocate(alloc: Allocate) -> Self {
        ir_assert!(
            alloc.condition.ty().is_bool() && alloc.condition.ty().is_scalar(),
            "Allocate condition has type {}",
            alloc.condition.ty()
        );
        for extent in &alloc.extents {
            ir_assert!(
                extent.ty().is_integral() && extent.ty().is_scalar(),
                "Allocate extent of `{}` has type {}",
                alloc.name,
                extent.ty()
            );
        }
        Stmt::make(StmtKind::Allocate(alloc))
    }

    pub fn block(first: Stmt, rest: Stmt) -> Self {
        Stmt::make(StmtKind::Block { first, rest })
    }

    /// Right-nested sequence of `stmts`, preserving order.
    pub fn sequence(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        let stmts: Vec<Stmt> = stmts.into_iter().collect();
        let mut iter = stmts.into_iter().rev();
        let Some(mut result) = iter.next() else {
            ir_bug!("empty statement sequence");
        };
        for stmt in iter {
            result = Stmt::block(stmt, result);
        }
        result
    }

    pub fn if_then_else(condition: Expr, then_case: Stmt, else_case: Option<Stmt>) -> Self {
        ir_assert!(
            condition.ty().is_bool() && condition.ty().is_scalar(),
            "IfThenElse condition has type {}",
            condition.ty()
        );
        Stmt::make(StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        })
    }

    pub fn evaluate(value: Expr) -> Self {
        Stmt::make(StmtKind::Evaluate(value))
    }

    pub fn atomic(atomic: Atomic) -> Self {
        if !atomic.needs_mutex() {
            ir_assert!(
                atomic.mutex_indices.is_empty(),
                "atomic region of `{}` has mutex indices but no mutex",
                atomic.producer_name
            );
        }
        Stmt::make(StmtKind::Atomic(atomic))
    }

    /// `Atomic` region that needs no lock.
    pub fn atomic_unlocked(
        producer_name: impl Into<Name>,
        tuple_size: usize,
        dimensions: usize,
        body: Stmt,
    ) -> Self {
        Stmt::atomic(Atomic {
            producer_name: producer_name.into(),
            mutex_name: Name::empty(),
            mutex_indices: Vec::new(),
            tuple_size,
            dimensions,
            body,
        })
    }

    /// Statements of a right-nested block chain, in execution order.
    pub fn flatten_blocks(&self) -> Vec<Stmt> {
        let mut out = Vec::new();
        let mut pending = vec![self.clone()];
        while let Some(stmt) = pending.pop() {
            match stmt.kind() {
                StmtKind::Block { first, rest } => {
                    pending.push(rest.clone());
                    pending.push(first.clone());
                }
                _ => out.push(stmt),
            }
        }
        out
    }
}
