//! Value types of IR expressions.

use std::fmt;

use crate::{ir_assert, ir_bug, Expr};

/// Scalar type class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeCode {
    Int,
    UInt,
    Float,
    /// Opaque pointer to a runtime object.
    Handle,
}

/// Value type `{code, bits, lanes}`. `lanes > 1` is a SIMD vector.
///
/// Handle types additionally carry the name of the runtime type they point
/// to; two handles are the same type only if those names agree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type {
    code: TypeCode,
    bits: u8,
    lanes: u16,
    handle: Option<&'static str>,
}

impl Type {
    pub const fn new(code: TypeCode, bits: u8, lanes: u16) -> Self {
        Type {
            code,
            bits,
            lanes,
            handle: None,
        }
    }

    pub const fn int(bits: u8) -> Self {
        Type::new(TypeCode::Int, bits, 1)
    }

    pub const fn uint(bits: u8) -> Self {
        Type::new(TypeCode::UInt, bits, 1)
    }

    pub const fn float(bits: u8) -> Self {
        Type::new(TypeCode::Float, bits, 1)
    }

    /// `uint1`.
    pub const fn bool() -> Self {
        Type::uint(1)
    }

    /// 64-bit pointer to the runtime type `pointee`.
    pub const fn handle(pointee: &'static str) -> Self {
        Type {
            code: TypeCode::Handle,
            bits: 64,
            lanes: 1,
            handle: Some(pointee),
        }
    }

    #[inline]
    pub fn code(self) -> TypeCode {
        self.code
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.bits
    }

    #[inline]
    pub fn lanes(self) -> u16 {
        self.lanes
    }

    /// Runtime type name of a handle, `None` for value types.
    #[inline]
    pub fn handle_type(self) -> Option<&'static str> {
        self.handle
    }

    /// Same type with a different lane count.
    pub fn with_lanes(self, lanes: u16) -> Self {
        ir_assert!(lanes > 0, "type with zero lanes");
        Type { lanes, ..self }
    }

    /// Scalar element type.
    pub fn element_of(self) -> Self {
        self.with_lanes(1)
    }

    pub fn is_int(self) -> bool {
        self.code == TypeCode::Int
    }

    pub fn is_uint(self) -> bool {
        self.code == TypeCode::UInt
    }

    pub fn is_float(self) -> bool {
        self.code == TypeCode::Float
    }

    pub fn is_handle(self) -> bool {
        self.code == TypeCode::Handle
    }

    pub fn is_bool(self) -> bool {
        self.is_uint() && self.bits == 1
    }

    pub fn is_scalar(self) -> bool {
        self.lanes == 1
    }

    pub fn is_vector(self) -> bool {
        self.lanes > 1
    }

    /// `Int` or `UInt`.
    pub fn is_integral(self) -> bool {
        matches!(self.code, TypeCode::Int | TypeCode::UInt)
    }

    /// Whether `value` fits in this (integral) type.
    pub fn can_represent(self, value: i64) -> bool {
        match self.code {
            TypeCode::Int => {
                if self.bits >= 64 {
                    return true;
                }
                let half = 1i64 << (self.bits - 1);
                (-half..half).contains(&value)
            }
            TypeCode::UInt => u64::try_from(value)
                .is_ok_and(|value| self.bits >= 64 || value >> self.bits == 0),
            TypeCode::Float => true,
            TypeCode::Handle => false,
        }
    }

    /// Largest representable value (largest finite value for floats),
    /// broadcast to the lane count.
    pub fn max(self) -> Expr {
        let scalar = self.element_of();
        let value = match self.code {
            TypeCode::Int => Expr::int_imm(scalar, max_int(self.bits)),
            TypeCode::UInt => Expr::uint_imm(scalar, u64::MAX >> (64 - u32::from(self.bits))),
            TypeCode::Float => Expr::float_imm(scalar, max_float(self.bits)),
            TypeCode::Handle => ir_bug!("handle type {self} has no maximum"),
        };
        broadcast_if_vector(value, self.lanes)
    }

    /// Smallest representable value (most negative finite value for floats),
    /// broadcast to the lane count.
    pub fn min(self) -> Expr {
        let scalar = self.element_of();
        let value = match self.code {
            TypeCode::Int => Expr::int_imm(scalar, -max_int(self.bits) - 1),
            TypeCode::UInt => Expr::uint_imm(scalar, 0),
            TypeCode::Float => Expr::float_imm(scalar, -max_float(self.bits)),
            TypeCode::Handle => ir_bug!("handle type {self} has no minimum"),
        };
        broadcast_if_vector(value, self.lanes)
    }
}

fn max_int(bits: u8) -> i64 {
    if bits >= 64 {
        i64::MAX
    } else {
        (1i64 << (bits - 1)) - 1
    }
}

fn max_float(bits: u8) -> f64 {
    match bits {
        16 => 65504.0,
        32 => f64::from(f32::MAX),
        _ => f64::MAX,
    }
}

fn broadcast_if_vector(value: Expr, lanes: u16) -> Expr {
    if lanes > 1 {
        Expr::broadcast(value, lanes)
    } else {
        value
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.handle) {
            (TypeCode::Handle, Some(pointee)) => write!(f, "handle({pointee})")?,
            (TypeCode::Handle, None) => f.write_str("handle")?,
            (TypeCode::UInt, _) if self.bits == 1 => f.write_str("bool")?,
            (TypeCode::Int, _) => write!(f, "int{}", self.bits)?,
            (TypeCode::UInt, _) => write!(f, "uint{}", self.bits)?,
            (TypeCode::Float, _) => write!(f, "float{}", self.bits)?,
        }
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
