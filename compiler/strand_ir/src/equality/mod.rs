//! Structural comparison of IR trees.
//!
//! [`IrComparer`] defines a strict total order over expressions and
//! statements. The order is purely structural: two trees built along
//! different paths compare `Equal` when they have the same shape and
//! payloads. Checks run cheapest first:
//!
//! 1. identity (`same_as`) short-circuits to `Equal`;
//! 2. an undefined operand orders before a defined one;
//! 3. node kind, then (for expressions) the result type;
//! 4. a hit in the optional [`IrCompareCache`] short-circuits to `Equal`;
//! 5. children, in each kind's field order, up to the first difference.
//!
//! Uncached comparison of a DAG with heavy sharing re-walks every path and
//! is exponential in depth. [`graph_equal`] always supplies a cache, which
//! keeps the cost proportional to the number of distinct node pairs.

use std::cmp::Ordering;

use crate::stack::ensure_sufficient_stack;
use crate::{ir_bug, Expr, ExprKind, Stmt, StmtKind};

/// Default size of the cache used by [`graph_equal`], as a power of two.
pub const DEFAULT_CACHE_BITS: u32 = 8;

// ── Cache ───────────────────────────────────────────────────────────

enum CachedPair {
    Expr(Expr, Expr),
    Stmt(Stmt, Stmt),
}

/// Direct-mapped memo of node pairs already proven equal.
///
/// Slots are indexed by a hash of the two node addresses; a new pair evicts
/// whatever held its slot. Each slot holds the handles it records, so its
/// addresses cannot be recycled while the cache is alive.
pub struct IrCompareCache {
    mask: usize,
    slots: Vec<Option<CachedPair>>,
    hits: usize,
}

impl IrCompareCache {
    /// Cache with `2^bits` slots.
    pub fn new(bits: u32) -> Self {
        let bits = bits.min(24);
        let size = 1usize << bits;
        tracing::trace!(bits, "compare cache created");
        IrCompareCache {
            mask: size - 1,
            slots: std::iter::repeat_with(|| None).take(size).collect(),
            hits: 0,
        }
    }

    fn slot(&self, a: usize, b: usize) -> usize {
        ((a >> 4) ^ (b >> 4).rotate_left(13)) & self.mask
    }

    fn contains_expr(&mut self, a: &Expr, b: &Expr) -> bool {
        let hit = matches!(
            &self.slots[self.slot(a.addr(), b.addr())],
            Some(CachedPair::Expr(ca, cb)) if ca.same_as(a) && cb.same_as(b)
        );
        self.hits += usize::from(hit);
        hit
    }

    fn insert_expr(&mut self, a: &Expr, b: &Expr) {
        let slot = self.slot(a.addr(), b.addr());
        self.slots[slot] = Some(CachedPair::Expr(a.clone(), b.clone()));
    }

    fn contains_stmt(&mut self, a: &Stmt, b: &Stmt) -> bool {
        let hit = matches!(
            &self.slots[self.slot(a.addr(), b.addr())],
            Some(CachedPair::Stmt(ca, cb)) if ca.same_as(a) && cb.same_as(b)
        );
        self.hits += usize::from(hit);
        hit
    }

    fn insert_stmt(&mut self, a: &Stmt, b: &Stmt) {
        let slot = self.slot(a.addr(), b.addr());
        self.slots[slot] = Some(CachedPair::Stmt(a.clone(), b.clone()));
    }

    /// Number of comparisons answered from the cache so far.
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Forget every recorded pair.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.hits = 0;
    }
}

// ── Comparer ────────────────────────────────────────────────────────

/// One comparison session, optionally memoised.
#[derive(Default)]
pub struct IrComparer<'c> {
    cache: Option<&'c mut IrCompareCache>,
}

impl<'c> IrComparer<'c> {
    pub fn new() -> Self {
        IrComparer { cache: None }
    }

    pub fn with_cache(cache: &'c mut IrCompareCache) -> Self {
        IrComparer { cache: Some(cache) }
    }

    /// Order two possibly undefined expressions; undefined sorts first.
    pub fn compare_optional(&mut self, a: Option<&Expr>, b: Option<&Expr>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => self.compare_expr(a, b),
        }
    }

    fn compare_optional_stmt(&mut self, a: Option<&Stmt>, b: Option<&Stmt>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => self.compare_stmt(a, b),
        }
    }

    fn compare_expr_lists<'a>(
        &mut self,
        a: impl ExactSizeIterator<Item = &'a Expr>,
        b: impl ExactSizeIterator<Item = &'a Expr>,
    ) -> Ordering {
        a.len().cmp(&b.len()).then_with(|| {
            for (a, b) in a.zip(b) {
                let order = self.compare_expr(a, b);
                if order.is_ne() {
                    return order;
                }
            }
            Ordering::Equal
        })
    }

    pub fn compare_expr(&mut self, a: &Expr, b: &Expr) -> Ordering {
        if a.same_as(b) {
            return Ordering::Equal;
        }
        let order = a
            .node_kind()
            .cmp(&b.node_kind())
            .then_with(|| a.ty().cmp(&b.ty()));
        if order.is_ne() {
            return order;
        }
        if let Some(cache) = self.cache.as_deref_mut() {
            if cache.contains_expr(a, b) {
                return Ordering::Equal;
            }
        }
        let order = ensure_sufficient_stack(|| self.compare_expr_payloads(a, b));
        if order.is_eq() {
            if let Some(cache) = self.cache.as_deref_mut() {
                cache.insert_expr(a, b);
            }
        }
        order
    }

    /// Both nodes have the same kind and type.
    fn compare_expr_payloads(&mut self, a: &Expr, b: &Expr) -> Ordering {
        match (a.kind(), b.kind()) {
            (ExprKind::IntImm(x), ExprKind::IntImm(y)) => x.cmp(y),
            (ExprKind::UIntImm(x), ExprKind::UIntImm(y)) => x.cmp(y),
            (ExprKind::FloatImm(x), ExprKind::FloatImm(y)) => x.total_cmp(y),
            (ExprKind::StringImm(x), ExprKind::StringImm(y))
            | (ExprKind::Variable(x), ExprKind::Variable(y)) => x.cmp(y),
            (ExprKind::Cast(x), ExprKind::Cast(y)) | (ExprKind::Not(x), ExprKind::Not(y)) => {
                self.compare_expr(x, y)
            }
            (ExprKind::Binary { a: xa, b: xb, .. }, ExprKind::Binary { a: ya, b: yb, .. }) => self
                .compare_expr(xa, ya)
                .then_with(|| self.compare_expr(xb, yb)),
            (
                ExprKind::Select {
                    condition: xc,
                    true_value: xt,
                    false_value: xf,
                },
                ExprKind::Select {
                    condition: yc,
                    true_value: yt,
                    false_value: yf,
                },
            ) => self
                .compare_expr(xc, yc)
                .then_with(|| self.compare_expr(xt, yt))
                .then_with(|| self.compare_expr(xf, yf)),
            (
                ExprKind::Load {
                    name: xn,
                    index: xi,
                    predicate: xp,
                },
                ExprKind::Load {
                    name: yn,
                    index: yi,
                    predicate: yp,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| self.compare_expr(xi, yi))
                .then_with(|| self.compare_expr(xp, yp)),
            (
                ExprKind::Ramp {
                    base: xb,
                    stride: xs,
                    lanes: xl,
                },
                ExprKind::Ramp {
                    base: yb,
                    stride: ys,
                    lanes: yl,
                },
            ) => self
                .compare_expr(xb, yb)
                .then_with(|| self.compare_expr(xs, ys))
                .then_with(|| xl.cmp(yl)),
            (
                ExprKind::Broadcast {
                    value: xv,
                    lanes: xl,
                },
                ExprKind::Broadcast {
                    value: yv,
                    lanes: yl,
                },
            ) => self.compare_expr(xv, yv).then_with(|| xl.cmp(yl)),
            (
                ExprKind::Call {
                    name: xn,
                    args: xa,
                    call_type: xt,
                },
                ExprKind::Call {
                    name: yn,
                    args: ya,
                    call_type: yt,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| xt.cmp(yt))
                .then_with(|| self.compare_expr_lists(xa.iter(), ya.iter())),
            (
                ExprKind::Let {
                    name: xn,
                    value: xv,
                    body: xb,
                },
                ExprKind::Let {
                    name: yn,
                    value: yv,
                    body: yb,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| self.compare_expr(xv, yv))
                .then_with(|| self.compare_expr(xb, yb)),
            _ => ir_bug!(
                "comparator dispatch reached mismatched payloads for {:?}",
                a.node_kind()
            ),
        }
    }

    pub fn compare_stmt(&mut self, a: &Stmt, b: &Stmt) -> Ordering {
        if a.same_as(b) {
            return Ordering::Equal;
        }
        let order = a.node_kind().cmp(&b.node_kind());
        if order.is_ne() {
            return order;
        }
        if let Some(cache) = self.cache.as_deref_mut() {
            if cache.contains_stmt(a, b) {
                return Ordering::Equal;
            }
        }
        let order = ensure_sufficient_stack(|| self.compare_stmt_payloads(a, b));
        if order.is_eq() {
            if let Some(cache) = self.cache.as_deref_mut() {
                cache.insert_stmt(a, b);
            }
        }
        order
    }

    fn compare_stmt_payloads(&mut self, a: &Stmt, b: &Stmt) -> Ordering {
        match (a.kind(), b.kind()) {
            (
                StmtKind::LetStmt {
                    name: xn,
                    value: xv,
                    body: xb,
                },
                StmtKind::LetStmt {
                    name: yn,
                    value: yv,
                    body: yb,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| self.compare_expr(xv, yv))
                .then_with(|| self.compare_stmt(xb, yb)),
            (
                StmtKind::AssertStmt {
                    condition: xc,
                    message: xm,
                },
                StmtKind::AssertStmt {
                    condition: yc,
                    message: ym,
                },
            ) => self
                .compare_expr(xc, yc)
                .then_with(|| self.compare_expr(xm, ym)),
            (
                StmtKind::ProducerConsumer {
                    name: xn,
                    is_producer: xp,
                    body: xb,
                },
                StmtKind::ProducerConsumer {
                    name: yn,
                    is_producer: yp,
                    body: yb,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| xp.cmp(yp))
                .then_with(|| self.compare_stmt(xb, yb)),
            (
                StmtKind::For {
                    name: xn,
                    min: xm,
                    extent: xe,
                    for_type: xt,
                    body: xb,
                },
                StmtKind::For {
                    name: yn,
                    min: ym,
                    extent: ye,
                    for_type: yt,
                    body: yb,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| self.compare_expr(xm, ym))
                .then_with(|| self.compare_expr(xe, ye))
                .then_with(|| xt.cmp(yt))
                .then_with(|| self.compare_stmt(xb, yb)),
            (
                StmtKind::Store {
                    name: xn,
                    value: xv,
                    index: xi,
                    predicate: xp,
                },
                StmtKind::Store {
                    name: yn,
                    value: yv,
                    index: yi,
                    predicate: yp,
                },
            ) => xn
                .cmp(yn)
                .then_with(|| self.compare_expr(xv, yv))
                .then_with(|| self.compare_expr(xi, yi))
                .then_with(|| self.compare_expr(xp, yp)),
            (StmtKind::Allocate(x), StmtKind::Allocate(y)) => x
                .name
                .cmp(&y.name)
                .then_with(|| x.ty.cmp(&y.ty))
                .then_with(|| x.memory_type.cmp(&y.memory_type))
                .then_with(|| self.compare_expr_lists(x.extents.iter(), y.extents.iter()))
                .then_with(|| self.compare_expr(&x.condition, &y.condition))
                .then_with(|| self.compare_optional(x.new_expr.as_ref(), y.new_expr.as_ref()))
                .then_with(|| x.free_function.cmp(&y.free_function))
                .then_with(|| self.compare_stmt(&x.body, &y.body)),
            (
                StmtKind::Block {
                    first: xf,
                    rest: xr,
                },
                StmtKind::Block {
                    first: yf,
                    rest: yr,
                },
            ) => self
                .compare_stmt(xf, yf)
                .then_with(|| self.compare_stmt(xr, yr)),
            (
                StmtKind::IfThenElse {
                    condition: xc,
                    then_case: xt,
                    else_case: xe,
                },
                StmtKind::IfThenElse {
                    condition: yc,
                    then_case: yt,
                    else_case: ye,
                },
            ) => self
                .compare_expr(xc, yc)
                .then_with(|| self.compare_stmt(xt, yt))
                .then_with(|| self.compare_optional_stmt(xe.as_ref(), ye.as_ref())),
            (StmtKind::Evaluate(x), StmtKind::Evaluate(y)) => self.compare_expr(x, y),
            (StmtKind::Atomic(x), StmtKind::Atomic(y)) => x
                .producer_name
                .cmp(&y.producer_name)
                .then_with(|| x.mutex_name.cmp(&y.mutex_name))
                .then_with(|| x.tuple_size.cmp(&y.tuple_size))
                .then_with(|| x.dimensions.cmp(&y.dimensions))
                .then_with(|| {
                    self.compare_expr_lists(x.mutex_indices.iter(), y.mutex_indices.iter())
                })
                .then_with(|| self.compare_stmt(&x.body, &y.body)),
            _ => ir_bug!(
                "comparator dispatch reached mismatched payloads for {:?}",
                a.node_kind()
            ),
        }
    }
}

// ── Entry points ────────────────────────────────────────────────────

/// Uncached structural order.
pub fn deep_compare(a: &Expr, b: &Expr) -> Ordering {
    IrComparer::new().compare_expr(a, b)
}

/// Uncached structural equality.
pub fn equal(a: &Expr, b: &Expr) -> bool {
    deep_compare(a, b).is_eq()
}

/// Structural equality, memoised over shared subgraphs.
pub fn graph_equal(a: &Expr, b: &Expr) -> bool {
    let mut cache = IrCompareCache::new(DEFAULT_CACHE_BITS);
    let equal = IrComparer::with_cache(&mut cache).compare_expr(a, b).is_eq();
    tracing::trace!(equal, hits = cache.hits(), "graph comparison finished");
    equal
}

/// Uncached structural equality of statements.
pub fn stmt_equal(a: &Stmt, b: &Stmt) -> bool {
    IrComparer::new().compare_stmt(a, b).is_eq()
}

/// Memoised structural equality of statements.
pub fn graph_stmt_equal(a: &Stmt, b: &Stmt) -> bool {
    let mut cache = IrCompareCache::new(DEFAULT_CACHE_BITS);
    IrComparer::with_cache(&mut cache).compare_stmt(a, b).is_eq()
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        graph_equal(self, other)
    }
}

impl Eq for Expr {}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        graph_stmt_equal(self, other)
    }
}

impl Eq for Stmt {}

/// Expression ordered structurally, for use as a map or set key.
#[derive(Clone, Debug)]
pub struct ExprKey(pub Expr);

impl PartialEq for ExprKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for ExprKey {}

impl PartialOrd for ExprKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExprKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut cache = IrCompareCache::new(DEFAULT_CACHE_BITS);
        IrComparer::with_cache(&mut cache).compare_expr(&self.0, &other.0)
    }
}

impl From<Expr> for ExprKey {
    fn from(expr: Expr) -> Self {
        ExprKey(expr)
    }
}

#[cfg(test)]
mod tests;
