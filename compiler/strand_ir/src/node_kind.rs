//! Static discriminant of every concrete IR node.

/// Which concrete node a handle points at.
///
/// Declaration order is the cross-kind order used by the structural
/// comparator: nodes of different kinds never compare equal, and the
/// smaller discriminant sorts first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    // Expressions
    IntImm,
    UIntImm,
    FloatImm,
    StringImm,
    Cast,
    Variable,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
    And,
    Or,
    Not,
    Select,
    Load,
    Ramp,
    Broadcast,
    Call,
    Let,
    // Statements
    LetStmt,
    AssertStmt,
    ProducerConsumer,
    For,
    Store,
    Allocate,
    Block,
    IfThenElse,
    Evaluate,
    Atomic,
}

impl NodeKind {
    /// Whether this kind is an expression node.
    pub fn is_expr(self) -> bool {
        self <= NodeKind::Let
    }

    /// Whether this kind is a statement node.
    pub fn is_stmt(self) -> bool {
        !self.is_expr()
    }
}
