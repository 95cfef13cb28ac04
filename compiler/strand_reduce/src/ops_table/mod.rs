//! Table of known associative reduction operators.
//!
//! Each [`AssociativePattern`] is a template over placeholder variables:
//! `x<i>` stands for the accumulator of tuple component `i`, `y<i>` for the
//! value combined into it, and `k<i>` for a constant bound that is unified
//! against the candidate rather than matched literally.
//!
//! A lookup classifies the first expression's root node ([`RootKind`]) and
//! the element types ([`ValueBucket`]). On the first lookup for a concrete
//! `(types, root, arity)` key, the generic patterns for the root and arity
//! are concatenated with the bucket-specific ones and cached.
//!
//! Tuples of more than two components are never recognized, and neither
//! are vector or handle reductions.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use strand_ir::{op, BinaryOp, Expr, ExprKind, IrError, Name, Type, TypeCode};

/// Largest tuple arity with known patterns.
pub const MAX_ARITY: usize = 2;

/// Accumulator placeholder of tuple component `index`.
pub fn x_placeholder(index: usize) -> Name {
    Name::from(format!("x{index}"))
}

/// Combined-value placeholder of tuple component `index`.
pub fn y_placeholder(index: usize) -> Name {
    Name::from(format!("y{index}"))
}

/// Constant-bound placeholder of tuple component `index`.
pub fn k_placeholder(index: usize) -> Name {
    Name::from(format!("k{index}"))
}

/// An associative operator with one template and identity per component.
#[derive(Clone, Debug)]
pub struct AssociativePattern {
    pub ops: SmallVec<[Expr; 2]>,
    pub identities: SmallVec<[Expr; 2]>,
    pub is_commutative: bool,
}

impl AssociativePattern {
    fn single(op: Expr, identity: Expr, is_commutative: bool) -> Self {
        AssociativePattern {
            ops: smallvec![op],
            identities: smallvec![identity],
            is_commutative,
        }
    }

    fn pair(ops: [Expr; 2], identities: [Expr; 2], is_commutative: bool) -> Self {
        AssociativePattern {
            ops: SmallVec::from_buf(ops),
            identities: SmallVec::from_buf(identities),
            is_commutative,
        }
    }

    /// Number of tuple components.
    pub fn arity(&self) -> usize {
        self.ops.len()
    }
}

impl fmt::Display for AssociativePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (op, identity)) in self.ops.iter().zip(&self.identities).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{op} (identity {identity})")?;
        }
        write!(f, "}} commutative={}", self.is_commutative)
    }
}

/// Root node class of a reduction update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootKind {
    Add,
    Sub,
    Mul,
    Min,
    Max,
    Select,
    And,
    Or,
    Cast,
    Unknown,
}

impl RootKind {
    pub fn of(expr: &Expr) -> Self {
        match expr.kind() {
            ExprKind::Binary { op, .. } => match op {
                BinaryOp::Add => RootKind::Add,
                BinaryOp::Sub => RootKind::Sub,
                BinaryOp::Mul => RootKind::Mul,
                BinaryOp::Min => RootKind::Min,
                BinaryOp::Max => RootKind::Max,
                BinaryOp::And => RootKind::And,
                BinaryOp::Or => RootKind::Or,
                BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge => RootKind::Unknown,
            },
            ExprKind::Select { .. } => RootKind::Select,
            ExprKind::Cast(_) => RootKind::Cast,
            _ => RootKind::Unknown,
        }
    }
}

/// Coarse scalar type class selecting type-specific patterns.
///
/// Every scalar type also receives the generic patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueBucket {
    UInt1,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Float32,
    Float64,
}

impl ValueBucket {
    /// Bucket of a scalar, non-handle type.
    pub fn of(ty: Type) -> Option<Self> {
        if !ty.is_scalar() {
            return None;
        }
        Some(match (ty.code(), ty.bits()) {
            (TypeCode::UInt, 1) => ValueBucket::UInt1,
            (TypeCode::UInt, 8) => ValueBucket::UInt8,
            (TypeCode::UInt, 16) => ValueBucket::UInt16,
            (TypeCode::UInt, 32) => ValueBucket::UInt32,
            (TypeCode::UInt, 64) => ValueBucket::UInt64,
            (TypeCode::Int, 8) => ValueBucket::Int8,
            (TypeCode::Int, 16) => ValueBucket::Int16,
            (TypeCode::Int, 32) => ValueBucket::Int32,
            (TypeCode::Int, 64) => ValueBucket::Int64,
            (TypeCode::Float, 16) => ValueBucket::Float16,
            (TypeCode::Float, 32) => ValueBucket::Float32,
            (TypeCode::Float, 64) => ValueBucket::Float64,
            _ => return None,
        })
    }

    fn is_float(self) -> bool {
        matches!(
            self,
            ValueBucket::Float16 | ValueBucket::Float32 | ValueBucket::Float64
        )
    }
}

/// Cache key: the concrete element types, root class and arity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub types: SmallVec<[Type; 2]>,
    pub root: RootKind,
    pub arity: usize,
}

// ── Pattern construction ────────────────────────────────────────────

/// Placeholders and constants of one tuple component.
struct Slot {
    ty: Type,
    x: Expr,
    y: Expr,
    k: Expr,
}

impl Slot {
    fn new(ty: Type, index: usize) -> Self {
        Slot {
            ty,
            x: Expr::var(ty, x_placeholder(index)),
            y: Expr::var(ty, y_placeholder(index)),
            k: Expr::var(ty, k_placeholder(index)),
        }
    }

    fn zero(&self) -> Expr {
        op::make_zero(self.ty)
    }

    fn one(&self) -> Expr {
        op::make_one(self.ty)
    }
}

fn general_single(s: &Slot, root: RootKind, table: &mut Vec<AssociativePattern>) {
    let (x, y) = (s.x.clone(), s.y.clone());
    match root {
        RootKind::Add => table.push(AssociativePattern::single(x + y, s.zero(), true)),
        RootKind::Mul => table.push(AssociativePattern::single(x * y, s.one(), true)),
        RootKind::Max => table.push(AssociativePattern::single(op::max(x, y), s.ty.min(), true)),
        RootKind::Min => table.push(AssociativePattern::single(op::min(x, y), s.ty.max(), true)),
        // No single accumulator state represents a running difference or a
        // running select, so neither has a generic pattern.
        RootKind::Sub
        | RootKind::Select
        | RootKind::And
        | RootKind::Or
        | RootKind::Cast
        | RootKind::Unknown => {}
    }
}

fn general_double(s0: &Slot, s1: &Slot, root: RootKind, table: &mut Vec<AssociativePattern>) {
    match root {
        // Maximum with its payload (argmax).
        RootKind::Max => table.push(AssociativePattern::pair(
            [
                op::max(s0.x.clone(), s0.y.clone()),
                op::select(op::lt(s0.y.clone(), s0.x.clone()), s1.x.clone(), s1.y.clone()),
            ],
            [s0.ty.min(), s1.zero()],
            true,
        )),
        // Minimum with its payload (argmin).
        RootKind::Min => table.push(AssociativePattern::pair(
            [
                op::min(s0.x.clone(), s0.y.clone()),
                op::select(op::lt(s0.x.clone(), s0.y.clone()), s1.x.clone(), s1.y.clone()),
            ],
            [s0.ty.max(), s1.zero()],
            true,
        )),
        // Complex multiplication, rooted at the real part's subtraction.
        RootKind::Sub if s0.ty == s1.ty => {
            let (x0, y0, x1, y1) = (&s0.x, &s0.y, &s1.x, &s1.y);
            table.push(AssociativePattern::pair(
                [x0 * y0 - x1 * y1, x1 * y0 + x0 * y1],
                [s0.one(), s1.zero()],
                true,
            ));
            table.push(AssociativePattern::pair(
                [x0 * y0 - y1 * x1, x1 * y0 + y1 * x0],
                [s0.one(), s1.zero()],
                true,
            ));
        }
        _ => {}
    }
}

/// `cast<t>(min(cast<wide>(x0) + cast<wide>(y0), k0))` for each wider type.
fn saturating_rescales(s: &Slot, wides: &[u8], table: &mut Vec<AssociativePattern>) {
    for &bits in wides {
        let wide = Type::uint(bits);
        let k = Expr::var(wide, k_placeholder(0));
        let sum = op::cast(wide, s.x.clone()) + op::cast(wide, s.y.clone());
        let update = op::cast(s.ty, op::min(sum, k));
        table.push(AssociativePattern::single(update, s.zero(), true));
    }
}

/// Saturating add clamped at the symbolic bound `k0`, in both select forms.
fn saturating_adds(s: &Slot, table: &mut Vec<AssociativePattern>) {
    let (x, y, k) = (&s.x, &s.y, &s.k);
    table.push(AssociativePattern::single(
        op::select(op::gt(x.clone(), k - y), k.clone(), x + y),
        s.zero(),
        true,
    ));
    table.push(AssociativePattern::single(
        op::select(op::lt(x.clone(), k - y), x + y, k.clone()),
        s.zero(),
        true,
    ));
}

/// NaN-propagating max and min written as selects.
fn nan_propagating_selects(s: &Slot, table: &mut Vec<AssociativePattern>) {
    let (x, y) = (&s.x, &s.y);
    let picks_x = |cmp: Expr| op::or(op::is_nan(x.clone()), cmp);
    for (cmp, identity) in [
        (op::gt(x.clone(), y.clone()), s.ty.min()),
        (op::ge(x.clone(), y.clone()), s.ty.min()),
        (op::lt(x.clone(), y.clone()), s.ty.max()),
        (op::le(x.clone(), y.clone()), s.ty.max()),
    ] {
        table.push(AssociativePattern::single(
            op::select(picks_x(cmp), x.clone(), y.clone()),
            identity,
            true,
        ));
    }
}

fn typed_single(
    s: &Slot,
    bucket: ValueBucket,
    root: RootKind,
    table: &mut Vec<AssociativePattern>,
) {
    match (bucket, root) {
        (ValueBucket::UInt1, RootKind::And) => table.push(AssociativePattern::single(
            op::and(s.x.clone(), s.y.clone()),
            op::const_true(1),
            true,
        )),
        (ValueBucket::UInt1, RootKind::Or) => table.push(AssociativePattern::single(
            op::or(s.x.clone(), s.y.clone()),
            op::const_false(1),
            true,
        )),
        (ValueBucket::UInt8, RootKind::Cast) => saturating_rescales(s, &[16, 32, 64], table),
        (ValueBucket::UInt16, RootKind::Cast) => saturating_rescales(s, &[32, 64], table),
        (ValueBucket::UInt32, RootKind::Cast) => saturating_rescales(s, &[64], table),
        (ValueBucket::UInt8 | ValueBucket::UInt16 | ValueBucket::UInt32, RootKind::Select) => {
            saturating_adds(s, table);
        }
        (b, RootKind::Select) if b.is_float() => nan_propagating_selects(s, table),
        _ => {}
    }
}

fn populate(types: &[Type], root: RootKind) -> Vec<AssociativePattern> {
    let mut table = Vec::new();
    match types {
        [t0] => {
            let s0 = Slot::new(*t0, 0);
            general_single(&s0, root, &mut table);
            if let Some(bucket) = ValueBucket::of(*t0) {
                typed_single(&s0, bucket, root, &mut table);
            }
        }
        [t0, t1] => {
            let (s0, s1) = (Slot::new(*t0, 0), Slot::new(*t1, 1));
            general_double(&s0, &s1, root, &mut table);
        }
        _ => {}
    }
    table
}

// ── Cache ───────────────────────────────────────────────────────────

/// Lazily populated pattern tables.
///
/// Read-mostly after warm-up; lookups take a shared lock and population
/// takes the exclusive lock once per key.
#[derive(Default)]
pub struct OpsTableCache {
    tables: RwLock<FxHashMap<TableKey, Arc<[AssociativePattern]>>>,
}

impl OpsTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pattern `exprs` might instantiate, in table order.
    ///
    /// # Errors
    ///
    /// [`IrError::EmptyReductionTuple`] for an empty slice and
    /// [`IrError::MismatchedTupleTypes`] when the elements differ in type.
    pub fn get_ops_table(&self, exprs: &[Expr]) -> Result<Arc<[AssociativePattern]>, IrError> {
        let Some(first) = exprs.first() else {
            return Err(IrError::EmptyReductionTuple);
        };
        if let Some((index, found)) = exprs
            .iter()
            .enumerate()
            .find(|(_, e)| e.ty() != first.ty())
        {
            return Err(IrError::MismatchedTupleTypes {
                first: first.ty(),
                index,
                found: found.ty(),
            });
        }
        if exprs.len() > MAX_ARITY {
            tracing::debug!(arity = exprs.len(), "no associative patterns above arity 2");
            return Ok(Arc::from([]));
        }
        let root = RootKind::of(first);
        if root == RootKind::Unknown || ValueBucket::of(first.ty()).is_none() {
            tracing::debug!(ty = %first.ty(), ?root, "no associative patterns for root or type");
            return Ok(Arc::from([]));
        }

        let key = TableKey {
            types: exprs.iter().map(Expr::ty).collect(),
            root,
            arity: exprs.len(),
        };
        if let Some(table) = self.tables.read().get(&key) {
            tracing::trace!(?key, patterns = table.len(), "ops table hit");
            return Ok(Arc::clone(table));
        }
        let mut tables = self.tables.write();
        let table = tables.entry(key).or_insert_with_key(|key| {
            let table: Arc<[AssociativePattern]> = populate(&key.types, key.root).into();
            tracing::debug!(?key, patterns = table.len(), "ops table populated");
            table
        });
        Ok(Arc::clone(table))
    }

    /// Number of populated keys.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Look up the patterns for `exprs` in `cache`.
pub fn get_ops_table(
    cache: &OpsTableCache,
    exprs: &[Expr],
) -> Result<Arc<[AssociativePattern]>, IrError> {
    cache.get_ops_table(exprs)
}

#[cfg(test)]
mod tests;
