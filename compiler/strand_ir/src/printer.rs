//! Human-readable rendering of IR, for tracing output and test failures.
//!
//! Expressions print on one line with every binary operator parenthesised.
//! Statements print one per line, nested bodies indented by two spaces.

use std::fmt::{self, Write};

use crate::stack::ensure_sufficient_stack;
use crate::{op, BinaryOp, Expr, ExprKind, ForType, Stmt, StmtKind};

struct Printer<'a, 'f> {
    out: &'a mut fmt::Formatter<'f>,
    indent: usize,
}

impl Printer<'_, '_> {
    fn expr(&mut self, expr: &Expr) -> fmt::Result {
        ensure_sufficient_stack(|| self.expr_inner(expr))
    }

    fn args(&mut self, args: &[&Expr]) -> fmt::Result {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.expr(arg)?;
        }
        Ok(())
    }

    fn predicate(&mut self, predicate: &Expr) -> fmt::Result {
        if op::is_const_value(predicate, 1) {
            Ok(())
        } else {
            self.out.write_str(" if ")?;
            self.expr(predicate)
        }
    }

    fn expr_inner(&mut self, expr: &Expr) -> fmt::Result {
        let ty = expr.ty();
        match expr.kind() {
            ExprKind::IntImm(v) if ty.bits() == 32 => write!(self.out, "{v}"),
            ExprKind::IntImm(v) => write!(self.out, "({ty}){v}"),
            ExprKind::UIntImm(v) if ty.is_bool() => {
                self.out.write_str(if *v == 0 { "false" } else { "true" })
            }
            ExprKind::UIntImm(v) => write!(self.out, "({ty}){v}"),
            ExprKind::FloatImm(v) if ty.bits() == 32 => write!(self.out, "{v:?}f"),
            ExprKind::FloatImm(v) => write!(self.out, "{v:?}"),
            ExprKind::StringImm(text) => write!(self.out, "{:?}", text.as_str()),
            ExprKind::Cast(value) => {
                write!(self.out, "{ty}(")?;
                self.expr(value)?;
                self.out.write_char(')')
            }
            ExprKind::Variable(name) => write!(self.out, "{name}"),
            ExprKind::Binary { op, a, b } => match op.symbol() {
                Some(symbol) => {
                    self.out.write_char('(')?;
                    self.expr(a)?;
                    write!(self.out, " {symbol} ")?;
                    self.expr(b)?;
                    self.out.write_char(')')
                }
                None => {
                    let name = if *op == BinaryOp::Min { "min" } else { "max" };
                    write!(self.out, "{name}(")?;
                    self.args(&[a, b])?;
                    self.out.write_char(')')
                }
            },
            ExprKind::Not(value) => {
                self.out.write_char('!')?;
                self.expr(value)
            }
            ExprKind::Select {
                condition,
                true_value,
                false_value,
            } => {
                self.out.write_str("select(")?;
                self.args(&[condition, true_value, false_value])?;
                self.out.write_char(')')
            }
            ExprKind::Load {
                name,
                index,
                predicate,
            } => {
                write!(self.out, "{name}[")?;
                self.expr(index)?;
                self.out.write_char(']')?;
                self.predicate(predicate)
            }
            ExprKind::Ramp {
                base,
                stride,
                lanes,
            } => {
                self.out.write_str("ramp(")?;
                self.args(&[base, stride])?;
                write!(self.out, ", {lanes})")
            }
            ExprKind::Broadcast { value, lanes } => {
                write!(self.out, "x{lanes}(")?;
                self.expr(value)?;
                self.out.write_char(')')
            }
            ExprKind::Call { name, args, .. } => {
                write!(self.out, "{name}(")?;
                let args: Vec<&Expr> = args.iter().collect();
                self.args(&args)?;
                self.out.write_char(')')
            }
            ExprKind::Let { name, value, body } => {
                write!(self.out, "(let {name} = ")?;
                self.expr(value)?;
                self.out.write_str(" in ")?;
                self.expr(body)?;
                self.out.write_char(')')
            }
        }
    }

    fn line_start(&mut self) -> fmt::Result {
        for _ in 0..self.indent {
            self.out.write_str("  ")?;
        }
        Ok(())
    }

    fn nested(&mut self, body: &Stmt) -> fmt::Result {
        self.out.write_str(" {\n")?;
        self.indent += 1;
        self.stmt(body)?;
        self.indent -= 1;
        self.line_start()?;
        self.out.write_str("}\n")
    }

    fn stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        ensure_sufficient_stack(|| self.stmt_inner(stmt))
    }

    fn stmt_inner(&mut self, stmt: &Stmt) -> fmt::Result {
        if let StmtKind::Block { first, rest } = stmt.kind() {
            self.stmt(first)?;
            return self.stmt(rest);
        }
        self.line_start()?;
        match stmt.kind() {
            StmtKind::LetStmt { name, value, body } => {
                write!(self.out, "let {name} = ")?;
                self.expr(value)?;
                self.out.write_char('\n')?;
                self.stmt(body)
            }
            StmtKind::AssertStmt { condition, message } => {
                self.out.write_str("assert(")?;
                self.args(&[condition, message])?;
                self.out.write_str(")\n")
            }
            StmtKind::ProducerConsumer {
                name,
                is_producer,
                body,
            } => {
                let verb = if *is_producer { "produce" } else { "consume" };
                write!(self.out, "{verb} {name}")?;
                self.nested(body)
            }
            StmtKind::For {
                name,
                min,
                extent,
                for_type,
                body,
            } => {
                let keyword = match for_type {
                    ForType::Serial => "for",
                    ForType::Parallel => "parallel",
                    ForType::Vectorized => "vectorized",
                    ForType::Unrolled => "unrolled",
                };
                write!(self.out, "{keyword} ({name}, ")?;
                self.args(&[min, extent])?;
                self.out.write_char(')')?;
                self.nested(body)
            }
            StmtKind::Store {
                name,
                value,
                index,
                predicate,
            } => {
                write!(self.out, "{name}[")?;
                self.expr(index)?;
                self.out.write_str("] = ")?;
                self.expr(value)?;
                self.predicate(predicate)?;
                self.out.write_char('\n')
            }
            StmtKind::Allocate(alloc) => {
                write!(self.out, "allocate {}[{}", alloc.name, alloc.ty)?;
                for extent in &alloc.extents {
                    self.out.write_str(" * ")?;
                    self.expr(extent)?;
                }
                write!(self.out, "] in {:?}", alloc.memory_type)?;
                if !op::is_const_value(&alloc.condition, 1) {
                    self.out.write_str(" if ")?;
                    self.expr(&alloc.condition)?;
                }
                if let Some(new_expr) = &alloc.new_expr {
                    self.out.write_str(" custom_new ")?;
                    self.expr(new_expr)?;
                }
                if let Some(free) = &alloc.free_function {
                    write!(self.out, " custom_delete {free}")?;
                }
                self.nested(&alloc.body)
            }
            StmtKind::Block { .. } => unreachable!("blocks are flattened above"),
            StmtKind::IfThenElse {
                condition,
                then_case,
                else_case,
            } => {
                self.out.write_str("if (")?;
                self.expr(condition)?;
                self.out.write_char(')')?;
                self.nested(then_case)?;
                if let Some(else_case) = else_case {
                    self.line_start()?;
                    self.out.write_str("else")?;
                    self.nested(else_case)?;
                }
                Ok(())
            }
            StmtKind::Evaluate(value) => {
                self.expr(value)?;
                self.out.write_char('\n')
            }
            StmtKind::Atomic(atomic) => {
                self.out.write_str("atomic")?;
                if atomic.needs_mutex() {
                    write!(self.out, " ({}", atomic.mutex_name)?;
                    for index in &atomic.mutex_indices {
                        self.out.write_str(", ")?;
                        self.expr(index)?;
                    }
                    self.out.write_char(')')?;
                }
                self.nested(&atomic.body)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer { out: f, indent: 0 }.expr(self)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer { out: f, indent: 0 }.stmt(self)
    }
}

impl fmt::Debug for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
