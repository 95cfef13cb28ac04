//! Operator helpers and small queries over expressions.

use rustc_hash::FxHashSet;

use crate::visitor::{walk_expr, IrVisitor, VisitedNodes};
use crate::{ir_bug, BinaryOp, CallType, Expr, ExprKind, Name, Type, TypeCode};

/// Intrinsic name of the NaN test.
pub const IS_NAN: &str = "is_nan";

/// Constant `value` of type `ty`, wrapping integers to the type's width and
/// broadcasting to its lane count.
pub fn make_const(ty: Type, value: i64) -> Expr {
    let scalar = ty.element_of();
    let imm = match ty.code() {
        TypeCode::Int => {
            let shift = 64 - u32::from(ty.bits());
            Expr::int_imm(scalar, (value << shift) >> shift)
        }
        TypeCode::UInt => {
            let mask = u64::MAX >> (64 - u32::from(ty.bits()));
            #[expect(clippy::cast_sign_loss, reason = "two's complement wrap")]
            let bits = value as u64;
            Expr::uint_imm(scalar, bits & mask)
        }
        TypeCode::Float => {
            #[expect(clippy::cast_precision_loss, reason = "constants are small integers")]
            let value = value as f64;
            Expr::float_imm(scalar, value)
        }
        TypeCode::Handle => ir_bug!("no constants of handle type {ty}"),
    };
    if ty.is_vector() {
        Expr::broadcast(imm, ty.lanes())
    } else {
        imm
    }
}

pub fn make_zero(ty: Type) -> Expr {
    make_const(ty, 0)
}

pub fn make_one(ty: Type) -> Expr {
    make_const(ty, 1)
}

/// Boolean `true` with `lanes` lanes.
pub fn const_true(lanes: u16) -> Expr {
    make_const(Type::bool().with_lanes(lanes), 1)
}

/// Boolean `false` with `lanes` lanes.
pub fn const_false(lanes: u16) -> Expr {
    make_const(Type::bool().with_lanes(lanes), 0)
}

pub fn min(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Min, a, b)
}

pub fn max(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Max, a, b)
}

pub fn select(condition: Expr, true_value: Expr, false_value: Expr) -> Expr {
    Expr::select(condition, true_value, false_value)
}

pub fn cast(ty: Type, value: Expr) -> Expr {
    Expr::cast(ty, value)
}

pub fn eq(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Eq, a, b)
}

pub fn ne(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Ne, a, b)
}

pub fn lt(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Lt, a, b)
}

pub fn le(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Le, a, b)
}

pub fn gt(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Gt, a, b)
}

pub fn ge(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Ge, a, b)
}

pub fn and(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::And, a, b)
}

pub fn or(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Or, a, b)
}

pub fn not(a: Expr) -> Expr {
    Expr::not(a)
}

/// `is_nan(value)` as a pure intrinsic call.
pub fn is_nan(value: Expr) -> Expr {
    let ty = Type::bool().with_lanes(value.ty().lanes());
    Expr::call(ty, IS_NAN, [value], CallType::PureExtern)
}

/// Immediate, or a broadcast of one.
pub fn is_const(e: &Expr) -> bool {
    match e.kind() {
        ExprKind::IntImm(_) | ExprKind::UIntImm(_) | ExprKind::FloatImm(_) | ExprKind::StringImm(_) => {
            true
        }
        ExprKind::Broadcast { value, .. } => is_const(value),
        _ => false,
    }
}

/// Value of a signed integer constant (or a broadcast of one).
pub fn as_const_int(e: &Expr) -> Option<i64> {
    match e.kind() {
        ExprKind::IntImm(v) => Some(*v),
        ExprKind::Broadcast { value, .. } => as_const_int(value),
        _ => None,
    }
}

/// Whether `e` is an integer constant equal to `value`.
pub fn is_const_value(e: &Expr, value: i64) -> bool {
    match e.kind() {
        ExprKind::IntImm(v) => *v == value,
        ExprKind::UIntImm(v) => u64::try_from(value).is_ok_and(|value| *v == value),
        ExprKind::Broadcast { value: inner, .. } => is_const_value(inner, value),
        _ => false,
    }
}

// ── Uses ────────────────────────────────────────────────────────────

/// Finds `Variable` or `Load` references to a set of names.
///
/// Graph-aware: a shared subexpression is inspected once. Shadowing `Let`s
/// are not tracked, so the answer is conservative.
struct UsesNames<'a> {
    names: &'a FxHashSet<Name>,
    vars: bool,
    loads: bool,
    found: bool,
    visited: VisitedNodes,
}

impl IrVisitor for UsesNames<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::Variable(name) if self.vars && self.names.contains(name) => {
                self.found = true;
            }
            ExprKind::Load { name, .. } if self.loads && self.names.contains(name) => {
                self.found = true;
            }
            _ => walk_expr(self, expr),
        }
    }

    fn include_expr(&mut self, expr: &Expr) {
        if !self.found && self.visited.first_visit_expr(expr) {
            self.visit_expr(expr);
        }
    }
}

fn uses_names(e: &Expr, names: &FxHashSet<Name>, vars: bool, loads: bool) -> bool {
    let mut finder = UsesNames {
        names,
        vars,
        loads,
        found: false,
        visited: VisitedNodes::default(),
    };
    finder.include_expr(e);
    finder.found
}

/// Whether `e` references the variable `name`.
pub fn expr_uses_var(e: &Expr, name: &str) -> bool {
    let names = std::iter::once(Name::new(name)).collect();
    uses_names(e, &names, true, false)
}

/// Whether `e` references any variable in `names`.
pub fn expr_uses_vars(e: &Expr, names: &FxHashSet<Name>) -> bool {
    uses_names(e, names, true, false)
}

/// Whether `e` loads from any buffer in `names`.
pub fn expr_loads_from(e: &Expr, names: &FxHashSet<Name>) -> bool {
    uses_names(e, names, false, true)
}
