//! Expression nodes.
//!
//! An [`Expr`] is a shared handle to an immutable [`ExprNode`]. Cloning a
//! handle bumps a refcount; the graph is a DAG and the same subexpression is
//! routinely reachable from many parents. Nodes are never mutated after
//! construction; every rewrite builds new nodes.
//!
//! Construction goes through the associated factories (`Expr::add`,
//! `Expr::load`, ...), which check operand types. A type error at
//! construction time is a compiler bug and panics via [`ir_bug!`].

use std::ops;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::{ir_assert, op, Name, NodeKind, Type};

/// Binary operator of a [`ExprKind::Binary`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Comparison operators produce a boolean of the operand lane count.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// `And`/`Or` require boolean operands.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn node_kind(self) -> NodeKind {
        match self {
            BinaryOp::Add => NodeKind::Add,
            BinaryOp::Sub => NodeKind::Sub,
            BinaryOp::Mul => NodeKind::Mul,
            BinaryOp::Div => NodeKind::Div,
            BinaryOp::Mod => NodeKind::Mod,
            BinaryOp::Min => NodeKind::Min,
            BinaryOp::Max => NodeKind::Max,
            BinaryOp::Eq => NodeKind::EQ,
            BinaryOp::Ne => NodeKind::NE,
            BinaryOp::Lt => NodeKind::LT,
            BinaryOp::Le => NodeKind::LE,
            BinaryOp::Gt => NodeKind::GT,
            BinaryOp::Ge => NodeKind::GE,
            BinaryOp::And => NodeKind::And,
            BinaryOp::Or => NodeKind::Or,
        }
    }

    /// Infix spelling, or `None` for the function-style `min`/`max`.
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Min | BinaryOp::Max => return None,
        })
    }
}

/// How a [`ExprKind::Call`] is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallType {
    /// Runtime entry point with side effects.
    Extern,
    /// Runtime entry point without side effects.
    PureExtern,
    /// Operation understood by the backend (`is_nan`, ...).
    Intrinsic,
    /// Reference to another pipeline function.
    Func,
}

/// Call argument list; most calls take at most four.
pub type CallArgs = SmallVec<[Expr; 4]>;

/// Payload of an expression node.
#[derive(Clone)]
pub enum ExprKind {
    IntImm(i64),
    UIntImm(u64),
    FloatImm(f64),
    StringImm(Name),
    /// Conversion of the operand to the node's type.
    Cast(Expr),
    Variable(Name),
    Binary {
        op: BinaryOp,
        a: Expr,
        b: Expr,
    },
    Not(Expr),
    Select {
        condition: Expr,
        true_value: Expr,
        false_value: Expr,
    },
    /// Read `name[index]` where `predicate` holds.
    Load {
        name: Name,
        index: Expr,
        predicate: Expr,
    },
    /// `base, base + stride, ..., base + (lanes - 1) * stride`.
    Ramp {
        base: Expr,
        stride: Expr,
        lanes: u16,
    },
    Broadcast {
        value: Expr,
        lanes: u16,
    },
    Call {
        name: Name,
        args: CallArgs,
        call_type: CallType,
    },
    /// `let name = value in body`.
    Let {
        name: Name,
        value: Expr,
        body: Expr,
    },
}

/// Backing storage of an [`Expr`].
pub struct ExprNode {
    ty: Type,
    kind: ExprKind,
}

/// Shared handle to an immutable expression node.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    fn make(ty: Type, kind: ExprKind) -> Self {
        Expr(Arc::new(ExprNode { ty, kind }))
    }

    /// Type of the value this expression computes.
    #[inline]
    pub fn ty(&self) -> Type {
        self.0.ty
    }

    #[inline]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Reference identity. Implies structural equality; O(1).
    #[inline]
    pub fn same_as(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the backing node, for identity-keyed tables.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn node_kind(&self) -> NodeKind {
        match self.kind() {
            ExprKind::IntImm(_) => NodeKind::IntImm,
            ExprKind::UIntImm(_) => NodeKind::UIntImm,
            ExprKind::FloatImm(_) => NodeKind::FloatImm,
            ExprKind::StringImm(_) => NodeKind::StringImm,
            ExprKind::Cast(_) => NodeKind::Cast,
            ExprKind::Variable(_) => NodeKind::Variable,
            ExprKind::Binary { op, .. } => op.node_kind(),
            ExprKind::Not(_) => NodeKind::Not,
            ExprKind::Select { .. } => NodeKind::Select,
            ExprKind::Load { .. } => NodeKind::Load,
            ExprKind::Ramp { .. } => NodeKind::Ramp,
            ExprKind::Broadcast { .. } => NodeKind::Broadcast,
            ExprKind::Call { .. } => NodeKind::Call,
            ExprKind::Let { .. } => NodeKind::Let,
        }
    }

    // ── Factories ───────────────────────────────────────────────────

    pub fn int_imm(ty: Type, value: i64) -> Self {
        ir_assert!(
            ty.is_int() && ty.is_scalar(),
            "IntImm must be a scalar signed integer, got {ty}"
        );
        ir_assert!(ty.can_represent(value), "IntImm {value} does not fit in {ty}");
        Expr::make(ty, ExprKind::IntImm(value))
    }

    pub fn uint_imm(ty: Type, value: u64) -> Self {
        ir_assert!(
            ty.is_uint() && ty.is_scalar(),
            "UIntImm must be a scalar unsigned integer, got {ty}"
        );
        ir_assert!(
            ty.bits() >= 64 || value >> ty.bits() == 0,
            "UIntImm {value} does not fit in {ty}"
        );
        Expr::make(ty, ExprKind::UIntImm(value))
    }

    pub fn float_imm(ty: Type, value: f64) -> Self {
        ir_assert!(
            ty.is_float() && ty.is_scalar(),
            "FloatImm must be a scalar float, got {ty}"
        );
        Expr::make(ty, ExprKind::FloatImm(value))
    }

    pub fn string_imm(text: &str) -> Self {
        Expr::make(Type::handle("char"), ExprKind::StringImm(Name::new(text)))
    }

    pub fn cast(ty: Type, value: Expr) -> Self {
        ir_assert!(
            ty.lanes() == value.ty().lanes(),
            "cast from {} to {ty} changes the lane count",
            value.ty()
        );
        Expr::make(ty, ExprKind::Cast(value))
    }

    pub fn var(ty: Type, name: impl Into<Name>) -> Self {
        Expr::make(ty, ExprKind::Variable(name.into()))
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        ir_assert!(
            a.ty() == b.ty(),
            "{op:?} of mismatched types {} and {}",
            a.ty(),
            b.ty()
        );
        if op.is_logical() {
            ir_assert!(a.ty().is_bool(), "{op:?} of non-boolean type {}", a.ty());
        }
        let ty = if op.is_comparison() {
            Type::bool().with_lanes(a.ty().lanes())
        } else {
            a.ty()
        };
        Expr::make(ty, ExprKind::Binary { op, a, b })
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::binary(BinaryOp::Add, a, b)
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::binary(BinaryOp::Mul, a, b)
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::binary(BinaryOp::Div, a, b)
    }

    pub fn modulo(a: Expr, b: Expr) -> Self {
        Expr::binary(BinaryOp::Mod, a, b)
    }

    pub fn not(a: Expr) -> Self {
        ir_assert!(a.ty().is_bool(), "Not of non-boolean type {}", a.ty());
        let ty = a.ty();
        Expr::make(ty, ExprKind::Not(a))
    }

    pub fn select(condition: Expr, true_value: Expr, false_value: Expr) -> Self {
        ir_assert!(
            condition.ty().is_bool(),
            "Select condition has non-boolean type {}",
            condition.ty()
        );
        ir_assert!(
            true_value.ty() == false_value.ty(),
            "Select of mismatched types {} and {}",
            true_value.ty(),
            false_value.ty()
        );
        ir_assert!(
            condition.ty().is_scalar() || condition.ty().lanes() == true_value.ty().lanes(),
            "Select condition lanes {} do not match value lanes {}",
            condition.ty().lanes(),
            true_value.ty().lanes()
        );
        let ty = true_value.ty();
        Expr::make(
            ty,
            ExprKind::Select {
                condition,
                true_value,
                false_value,
            },
        )
    }

    /// Unpredicated load of `name[index]`.
    pub fn load(ty: Type, name: impl Into<Name>, index: Expr) -> Self {
        let predicate = op::const_true(ty.lanes());
        Expr::load_predicated(ty, name, index, predicate)
    }

    pub fn load_predicated(ty: Type, name: impl Into<Name>, index: Expr, predicate: Expr) -> Self {
        ir_assert!(
            index.ty().is_integral(),
            "Load index has non-integer type {}",
            index.ty()
        );
        ir_assert!(
            index.ty().lanes() == ty.lanes() && predicate.ty().lanes() == ty.lanes(),
            "Load of {ty} with index {} and predicate {}",
            index.ty(),
            predicate.ty()
        );
        ir_assert!(
            predicate.ty().is_bool(),
            "Load predicate has non-boolean type {}",
            predicate.ty()
        );
        Expr::make(
            ty,
            ExprKind::Load {
                name: name.into(),
                index,
                predicate,
            },
        )
    }

    pub fn ramp(base: Expr, stride: Expr, lanes: u16) -> Self {
        ir_assert!(lanes > 1, "Ramp of {lanes} lanes");
        ir_assert!(
            base.ty().is_scalar() && base.ty() == stride.ty(),
            "Ramp base {} and stride {} must be matching scalars",
            base.ty(),
            stride.ty()
        );
        let ty = base.ty().with_lanes(lanes);
        Expr::make(
            ty,
            ExprKind::Ramp {
                base,
                stride,
                lanes,
            },
        )
    }

    pub fn broadcast(value: Expr, lanes: u16) -> Self {
        ir_assert!(lanes > 1, "Broadcast to {lanes} lanes");
        ir_assert!(
            value.ty().is_scalar(),
            "Broadcast of vector type {}",
            value.ty()
        );
        let ty = value.ty().with_lanes(lanes);
        Expr::make(ty, ExprKind::Broadcast { value, lanes })
    }

    pub fn call(
        ty: Type,
        name: impl Into<Name>,
        args: impl IntoIterator<Item = Expr>,
        call_type: CallType,
    ) -> Self {
        Expr::make(
            ty,
            ExprKind::Call {
                name: name.into(),
                args: args.into_iter().collect(),
                call_type,
            },
        )
    }

    pub fn let_in(name: impl Into<Name>, value: Expr, body: Expr) -> Self {
        let ty = body.ty();
        Expr::make(
            ty,
            ExprKind::Let {
                name: name.into(),
                value,
                body,
            },
        )
    }

    // ── Shape queries ───────────────────────────────────────────────

    pub fn as_int_imm(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::IntImm(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint_imm(&self) -> Option<u64> {
        match self.kind() {
            ExprKind::UIntImm(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float_imm(&self) -> Option<f64> {
        match self.kind() {
            ExprKind::FloatImm(v) => Some(*v),
            _ => None,
        }
    }

    /// Name of a `Variable` node.
    pub fn as_variable(&self) -> Option<&Name> {
        match self.kind() {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::int_imm(Type::int(32), i64::from(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::uint_imm(Type::bool(), u64::from(value))
    }
}

impl From<f32> for Expr {
    fn from(value: f32) -> Self {
        Expr::float_imm(Type::float(32), f64::from(value))
    }
}

// ── Operator overloading ────────────────────────────────────────────
//
// Both operands must already agree in type. A plain integer on the right
// is converted to the type of the left operand.

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs.clone())
            }
        }

        impl ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs)
            }
        }

        impl ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self, rhs.clone())
            }
        }

        impl ops::$trait<i64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                let rhs = op::make_const(self.ty(), rhs);
                Expr::binary($op, self, rhs)
            }
        }

        impl ops::$trait<i64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self.clone(), op::make_const(self.ty(), rhs))
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);
impl_binary_operator!(Rem, rem, BinaryOp::Mod);

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        let zero = op::make_zero(self.ty());
        Expr::sub(zero, self)
    }
}

impl ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        -self.clone()
    }
}
