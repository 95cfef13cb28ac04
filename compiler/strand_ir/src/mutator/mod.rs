//! IR rewriting.
//!
//! An [`IrMutator`] maps each node to a possibly new node. The default
//! methods rebuild a node only when one of its children changed; if every
//! mutated child is [`same_as`](Expr::same_as) the original, the original
//! handle is returned. Callers can therefore detect a no-op rewrite with a
//! pointer comparison.
//!
//! Mutators that run over DAGs keep a [`GraphMemo`] so each shared node is
//! rewritten once.

use rustc_hash::FxHashMap;

use crate::scope::{Scope, Scoped};
use crate::stack::ensure_sufficient_stack;
use crate::{Allocate, Atomic, Expr, ExprKind, Name, Stmt, StmtKind};

/// IR rewriter.
pub trait IrMutator {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        mutate_expr_children(self, expr)
    }

    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        mutate_stmt_children(self, stmt)
    }
}

/// Mutate both halves of a binary-shaped node; `None` when neither changed.
fn mutate_pair<M: IrMutator + ?Sized>(mutator: &mut M, a: &Expr, b: &Expr) -> Option<(Expr, Expr)> {
    let new_a = mutator.mutate_expr(a);
    let new_b = mutator.mutate_expr(b);
    if new_a.same_as(a) && new_b.same_as(b) {
        None
    } else {
        Some((new_a, new_b))
    }
}

/// Mutate each expression of `exprs`; `None` when none changed.
fn mutate_list<'a, M, I>(mutator: &mut M, exprs: I) -> Option<Vec<Expr>>
where
    M: IrMutator + ?Sized,
    I: IntoIterator<Item = &'a Expr>,
{
    let mut changed = false;
    let out: Vec<Expr> = exprs
        .into_iter()
        .map(|e| {
            let new = mutator.mutate_expr(e);
            changed |= !new.same_as(e);
            new
        })
        .collect();
    changed.then_some(out)
}

/// Rebuild `expr` from mutated children, or return it unchanged.
pub fn mutate_expr_children<M: IrMutator + ?Sized>(mutator: &mut M, expr: &Expr) -> Expr {
    ensure_sufficient_stack(|| match expr.kind() {
        ExprKind::IntImm(_)
        | ExprKind::UIntImm(_)
        | ExprKind::FloatImm(_)
        | ExprKind::StringImm(_)
        | ExprKind::Variable(_) => expr.clone(),
        ExprKind::Cast(value) => {
            let new = mutator.mutate_expr(value);
            if new.same_as(value) {
                expr.clone()
            } else {
                Expr::cast(expr.ty(), new)
            }
        }
        ExprKind::Not(value) => {
            let new = mutator.mutate_expr(value);
            if new.same_as(value) {
                expr.clone()
            } else {
                Expr::not(new)
            }
        }
        ExprKind::Broadcast { value, lanes } => {
            let new = mutator.mutate_expr(value);
            if new.same_as(value) {
                expr.clone()
            } else {
                Expr::broadcast(new, *lanes)
            }
        }
        ExprKind::Binary { op, a, b } => match mutate_pair(mutator, a, b) {
            None => expr.clone(),
            Some((a, b)) => Expr::binary(*op, a, b),
        },
        ExprKind::Select {
            condition,
            true_value,
            false_value,
        } => match mutate_list(mutator, [condition, true_value, false_value]) {
            None => expr.clone(),
            Some(new) => {
                let [c, t, f]: [Expr; 3] = into_array(new);
                Expr::select(c, t, f)
            }
        },
        ExprKind::Load {
            name,
            index,
            predicate,
        } => match mutate_pair(mutator, index, predicate) {
            None => expr.clone(),
            Some((index, predicate)) => {
                Expr::load_predicated(expr.ty(), name.clone(), index, predicate)
            }
        },
        ExprKind::Ramp {
            base,
            stride,
            lanes,
        } => match mutate_pair(mutator, base, stride) {
            None => expr.clone(),
            Some((base, stride)) => Expr::ramp(base, stride, *lanes),
        },
        ExprKind::Call {
            name,
            args,
            call_type,
        } => match mutate_list(mutator, args) {
            None => expr.clone(),
            Some(args) => Expr::call(expr.ty(), name.clone(), args, *call_type),
        },
        ExprKind::Let { name, value, body } => match mutate_pair(mutator, value, body) {
            None => expr.clone(),
            Some((value, body)) => Expr::let_in(name.clone(), value, body),
        },
    })
}

fn into_array<const N: usize>(exprs: Vec<Expr>) -> [Expr; N] {
    match exprs.try_into() {
        Ok(array) => array,
        Err(exprs) => crate::ir_bug!("expected {N} mutated children, got {}", exprs.len()),
    }
}

/// Mutate `stmt` if present.
pub fn mutate_optional_stmt<M: IrMutator + ?Sized>(
    mutator: &mut M,
    stmt: Option<&Stmt>,
) -> Option<Stmt> {
    stmt.map(|s| mutator.mutate_stmt(s))
}

fn same_optional(new: Option<&Stmt>, old: Option<&Stmt>) -> bool {
    match (new, old) {
        (Some(new), Some(old)) => new.same_as(old),
        (None, None) => true,
        _ => false,
    }
}

/// Rebuild `stmt` from mutated children, or return it unchanged.
///
/// A `Block` mutates `first` before `rest` and keeps them in that order.
pub fn mutate_stmt_children<M: IrMutator + ?Sized>(mutator: &mut M, stmt: &Stmt) -> Stmt {
    ensure_sufficient_stack(|| match stmt.kind() {
        StmtKind::LetStmt { name, value, body } => {
            let new_value = mutator.mutate_expr(value);
            let new_body = mutator.mutate_stmt(body);
            if new_value.same_as(value) && new_body.same_as(body) {
                stmt.clone()
            } else {
                Stmt::let_stmt(name.clone(), new_value, new_body)
            }
        }
        StmtKind::AssertStmt { condition, message } => {
            match mutate_pair(mutator, condition, message) {
                None => stmt.clone(),
                Some((condition, message)) => Stmt::assert_stmt(condition, message),
            }
        }
        StmtKind::ProducerConsumer {
            name,
            is_producer,
            body,
        } => {
            let new_body = mutator.mutate_stmt(body);
            if new_body.same_as(body) {
                stmt.clone()
            } else {
                Stmt::producer_consumer(name.clone(), *is_producer, new_body)
            }
        }
        StmtKind::For {
            name,
            min,
            extent,
            for_type,
            body,
        } => {
            let bounds = mutate_pair(mutator, min, extent);
            let new_body = mutator.mutate_stmt(body);
            if bounds.is_none() && new_body.same_as(body) {
                stmt.clone()
            } else {
                let (min, extent) = bounds.unwrap_or_else(|| (min.clone(), extent.clone()));
                Stmt::for_loop(name.clone(), min, extent, *for_type, new_body)
            }
        }
        StmtKind::Store {
            name,
            value,
            index,
            predicate,
        } => match mutate_list(mutator, [value, index, predicate]) {
            None => stmt.clone(),
            Some(new) => {
                let [value, index, predicate]: [Expr; 3] = into_array(new);
                Stmt::store_predicated(name.clone(), value, index, predicate)
            }
        },
        StmtKind::Allocate(alloc) => {
            let extents = mutate_list(mutator, &alloc.extents);
            let condition = mutator.mutate_expr(&alloc.condition);
            let new_expr = alloc.new_expr.as_ref().map(|e| mutator.mutate_expr(e));
            let body = mutator.mutate_stmt(&alloc.body);
            let new_expr_same = match (&new_expr, &alloc.new_expr) {
                (Some(new), Some(old)) => new.same_as(old),
                _ => true,
            };
            if extents.is_none()
                && condition.same_as(&alloc.condition)
                && new_expr_same
                && body.same_as(&alloc.body)
            {
                stmt.clone()
            } else {
                Stmt::allocate(Allocate {
                    name: alloc.name.clone(),
                    ty: alloc.ty,
                    memory_type: alloc.memory_type,
                    extents: extents.unwrap_or_else(|| alloc.extents.clone()),
                    condition,
                    body,
                    new_expr,
                    free_function: alloc.free_function.clone(),
                })
            }
        }
        StmtKind::Block { first, rest } => {
            let new_first = mutator.mutate_stmt(first);
            let new_rest = mutator.mutate_stmt(rest);
            if new_first.same_as(first) && new_rest.same_as(rest) {
                stmt.clone()
            } else {
                Stmt::block(new_first, new_rest)
            }
        }
        StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        } => {
            let new_condition = mutator.mutate_expr(condition);
            let new_then = mutator.mutate_stmt(then_case);
            let new_else = mutate_optional_stmt(mutator, else_case.as_ref());
            if new_condition.same_as(condition)
                && new_then.same_as(then_case)
                && same_optional(new_else.as_ref(), else_case.as_ref())
            {
                stmt.clone()
            } else {
                Stmt::if_then_else(new_condition, new_then, new_else)
            }
        }
        StmtKind::Evaluate(value) => {
            let new = mutator.mutate_expr(value);
            if new.same_as(value) {
                stmt.clone()
            } else {
                Stmt::evaluate(new)
            }
        }
        StmtKind::Atomic(atomic) => {
            let indices = mutate_list(mutator, &atomic.mutex_indices);
            let body = mutator.mutate_stmt(&atomic.body);
            if indices.is_none() && body.same_as(&atomic.body) {
                stmt.clone()
            } else {
                Stmt::atomic(Atomic {
                    mutex_indices: indices.unwrap_or_else(|| atomic.mutex_indices.clone()),
                    body,
                    ..atomic.clone()
                })
            }
        }
    })
}

// ── Graph memo ──────────────────────────────────────────────────────

/// Mutation results keyed by node identity.
///
/// Each entry keeps the original handle alive, so an address cannot be
/// reused by a new node while the memo exists.
#[derive(Default)]
pub struct GraphMemo {
    exprs: FxHashMap<usize, (Expr, Expr)>,
    stmts: FxHashMap<usize, (Stmt, Stmt)>,
}

impl GraphMemo {
    pub fn expr(&self, original: &Expr) -> Option<Expr> {
        self.exprs.get(&original.addr()).map(|(_, result)| result.clone())
    }

    pub fn stmt(&self, original: &Stmt) -> Option<Stmt> {
        self.stmts.get(&original.addr()).map(|(_, result)| result.clone())
    }

    pub fn record_expr(&mut self, original: &Expr, result: &Expr) {
        self.exprs
            .insert(original.addr(), (original.clone(), result.clone()));
    }

    pub fn record_stmt(&mut self, original: &Stmt, result: &Stmt) {
        self.stmts
            .insert(original.addr(), (original.clone(), result.clone()));
    }

    pub fn clear(&mut self) {
        self.exprs.clear();
        self.stmts.clear();
    }
}

// ── Substitution ────────────────────────────────────────────────────

/// Replaces free occurrences of variables.
///
/// A `Let`, `LetStmt` or `For` that rebinds a replaced name hides it for
/// the extent of its body. Graph memoisation applies only outside of any
/// such shadowing binding, where a node's meaning is context free.
pub struct Substitute {
    replacements: FxHashMap<Name, Expr>,
    shadowed: Scope<()>,
    memo: GraphMemo,
}

impl Scoped for Substitute {
    type Binding = ();

    fn scope(&mut self) -> &mut Scope<()> {
        &mut self.shadowed
    }
}

impl Substitute {
    pub fn new(replacements: FxHashMap<Name, Expr>) -> Self {
        Substitute {
            replacements,
            shadowed: Scope::new(),
            memo: GraphMemo::default(),
        }
    }

    fn replaces(&self, name: &Name) -> bool {
        self.replacements.contains_key(name)
    }

    fn in_body<R>(&mut self, name: &Name, body: impl FnOnce(&mut Self) -> R) -> R {
        if self.replaces(name) {
            self.with_binding(name, (), body)
        } else {
            body(self)
        }
    }
}

impl IrMutator for Substitute {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        let memoize = self.shadowed.is_empty();
        if memoize {
            if let Some(done) = self.memo.expr(expr) {
                return done;
            }
        }
        let result = match expr.kind() {
            ExprKind::Variable(name) if !self.shadowed.contains(name) => {
                match self.replacements.get(name) {
                    Some(replacement) => {
                        crate::ir_assert!(
                            replacement.ty() == expr.ty(),
                            "substituting {} of type {} for `{name}` of type {}",
                            replacement,
                            replacement.ty(),
                            expr.ty()
                        );
                        replacement.clone()
                    }
                    None => expr.clone(),
                }
            }
            ExprKind::Let { name, value, body } => {
                let new_value = self.mutate_expr(value);
                let new_body = self.in_body(name, |this| this.mutate_expr(body));
                if new_value.same_as(value) && new_body.same_as(body) {
                    expr.clone()
                } else {
                    Expr::let_in(name.clone(), new_value, new_body)
                }
            }
            _ => mutate_expr_children(self, expr),
        };
        if memoize {
            self.memo.record_expr(expr, &result);
        }
        result
    }

    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt.kind() {
            StmtKind::LetStmt { name, value, body } => {
                let new_value = self.mutate_expr(value);
                let new_body = self.in_body(name, |this| this.mutate_stmt(body));
                if new_value.same_as(value) && new_body.same_as(body) {
                    stmt.clone()
                } else {
                    Stmt::let_stmt(name.clone(), new_value, new_body)
                }
            }
            StmtKind::For {
                name,
                min,
                extent,
                for_type,
                body,
            } => {
                let new_min = self.mutate_expr(min);
                let new_extent = self.mutate_expr(extent);
                let new_body = self.in_body(name, |this| this.mutate_stmt(body));
                if new_min.same_as(min) && new_extent.same_as(extent) && new_body.same_as(body) {
                    stmt.clone()
                } else {
                    Stmt::for_loop(name.clone(), new_min, new_extent, *for_type, new_body)
                }
            }
            _ => mutate_stmt_children(self, stmt),
        }
    }
}

/// Replace free occurrences of `name` in `expr` with `replacement`.
pub fn substitute(name: &str, replacement: &Expr, expr: &Expr) -> Expr {
    let mut replacements = FxHashMap::default();
    replacements.insert(Name::new(name), replacement.clone());
    Substitute::new(replacements).mutate_expr(expr)
}

/// Replace free occurrences of `name` in `stmt` with `replacement`.
pub fn substitute_in_stmt(name: &str, replacement: &Expr, stmt: &Stmt) -> Stmt {
    let mut replacements = FxHashMap::default();
    replacements.insert(Name::new(name), replacement.clone());
    Substitute::new(replacements).mutate_stmt(stmt)
}
