//! Structural matching of an expression against a pattern.
//!
//! Every `Variable` in a pattern is a wildcard. It matches any subexpression
//! of the same type, and a wildcard that occurs twice must bind structurally
//! equal subexpressions both times. All other pattern nodes must agree with
//! the expression in kind, type and non-child payload.

use rustc_hash::FxHashMap;

use crate::equality::graph_equal;
use crate::stack::ensure_sufficient_stack;
use crate::{Expr, ExprKind, Name};

/// Wildcard bindings produced by [`expr_match`].
pub type Bindings = FxHashMap<Name, Expr>;

/// Match `expr` against `pattern`, extending `bindings`.
///
/// On failure `bindings` may hold partial results and should be discarded.
pub fn expr_match(pattern: &Expr, expr: &Expr, bindings: &mut Bindings) -> bool {
    if pattern.ty() != expr.ty() {
        return false;
    }
    if let ExprKind::Variable(name) = pattern.kind() {
        return match bindings.get(name) {
            Some(bound) => bound.same_as(expr) || graph_equal(bound, expr),
            None => {
                bindings.insert(name.clone(), expr.clone());
                true
            }
        };
    }
    if pattern.node_kind() != expr.node_kind() {
        return false;
    }
    ensure_sufficient_stack(|| match (pattern.kind(), expr.kind()) {
        (ExprKind::IntImm(p), ExprKind::IntImm(e)) => p == e,
        (ExprKind::UIntImm(p), ExprKind::UIntImm(e)) => p == e,
        (ExprKind::FloatImm(p), ExprKind::FloatImm(e)) => p.total_cmp(e).is_eq(),
        (ExprKind::StringImm(p), ExprKind::StringImm(e)) => p == e,
        (ExprKind::Cast(p), ExprKind::Cast(e)) | (ExprKind::Not(p), ExprKind::Not(e)) => {
            expr_match(p, e, bindings)
        }
        (ExprKind::Binary { a: pa, b: pb, .. }, ExprKind::Binary { a: ea, b: eb, .. }) => {
            expr_match(pa, ea, bindings) && expr_match(pb, eb, bindings)
        }
        (
            ExprKind::Select {
                condition: pc,
                true_value: pt,
                false_value: pf,
            },
            ExprKind::Select {
                condition: ec,
                true_value: et,
                false_value: ef,
            },
        ) => {
            expr_match(pc, ec, bindings)
                && expr_match(pt, et, bindings)
                && expr_match(pf, ef, bindings)
        }
        (
            ExprKind::Load {
                name: pn,
                index: pi,
                predicate: pp,
            },
            ExprKind::Load {
                name: en,
                index: ei,
                predicate: ep,
            },
        ) => pn == en && expr_match(pi, ei, bindings) && expr_match(pp, ep, bindings),
        (
            ExprKind::Ramp {
                base: pb,
                stride: ps,
                ..
            },
            ExprKind::Ramp {
                base: eb,
                stride: es,
                ..
            },
        ) => expr_match(pb, eb, bindings) && expr_match(ps, es, bindings),
        (ExprKind::Broadcast { value: pv, .. }, ExprKind::Broadcast { value: ev, .. }) => {
            expr_match(pv, ev, bindings)
        }
        (
            ExprKind::Call {
                name: pn,
                args: pa,
                call_type: pt,
            },
            ExprKind::Call {
                name: en,
                args: ea,
                call_type: et,
            },
        ) => {
            pn == en
                && pt == et
                && pa.len() == ea.len()
                && pa.iter().zip(ea).all(|(p, e)| expr_match(p, e, bindings))
        }
        (
            ExprKind::Let {
                name: pn,
                value: pv,
                body: pb,
            },
            ExprKind::Let {
                name: en,
                value: ev,
                body: eb,
            },
        ) => pn == en && expr_match(pv, ev, bindings) && expr_match(pb, eb, bindings),
        _ => false,
    })
}
