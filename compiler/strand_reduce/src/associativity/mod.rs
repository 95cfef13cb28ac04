//! Proving reduction updates associative.
//!
//! An update for tuple component `i` is written in terms of the accumulator
//! variable `x_names[i]`. It is associative if it instantiates a pattern
//! from the ops table under these constraints:
//!
//! - every `x<j>` placeholder binds exactly the variable `x_names[j]`;
//! - every `y<j>` placeholder binds a subexpression that references no
//!   accumulator, and each component binds its own `y`;
//! - every `k<j>` placeholder binds a constant;
//! - bindings agree across tuple components.
//!
//! The matched operator is returned rewritten over the accumulators and a
//! fresh `y` variable per component (`<x_name>.y`), together with the
//! subexpressions those `y`s stand for.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use strand_ir::op::{expr_uses_vars, is_const};
use strand_ir::{expr_match, graph_equal, Bindings, Expr, IrError, IrMutator, Name, Substitute};

use crate::ops_table::{k_placeholder, x_placeholder, y_placeholder, AssociativePattern};
use crate::OpsTableCache;

/// A reduction operator proven associative.
#[derive(Clone, Debug)]
pub struct AssociativeOp {
    /// Operator over the accumulators and the `y` variables of `ys`.
    pub pattern: AssociativePattern,
    /// Accumulator of each tuple component.
    pub xs: SmallVec<[Name; 2]>,
    /// Per component, the `y` variable and the subexpression it replaces.
    /// Empty for a self assignment.
    pub ys: SmallVec<[(Name, Expr); 2]>,
    /// Constant bounds bound by `k` placeholders, ordered by placeholder.
    pub constants: SmallVec<[(Name, Expr); 1]>,
}

impl AssociativeOp {
    pub fn is_commutative(&self) -> bool {
        self.pattern.is_commutative
    }

    pub fn identities(&self) -> &[Expr] {
        &self.pattern.identities
    }
}

/// Name of the fresh variable standing for component `x`'s combined value.
pub fn y_name(x: &Name) -> Name {
    x.child("y")
}

/// Check `exprs` against the ops table.
///
/// Returns `Ok(None)` when no pattern applies.
///
/// # Errors
///
/// [`IrError::PlaceholderArity`] when `x_names` does not have one name per
/// expression, plus the lookup errors of [`OpsTableCache::get_ops_table`].
pub fn match_associative_op(
    cache: &OpsTableCache,
    exprs: &[Expr],
    x_names: &[Name],
) -> Result<Option<AssociativeOp>, IrError> {
    if exprs.is_empty() {
        return Err(IrError::EmptyReductionTuple);
    }
    if exprs.len() != x_names.len() {
        return Err(IrError::PlaceholderArity {
            names: x_names.len(),
            exprs: exprs.len(),
        });
    }
    let x_set: FxHashSet<Name> = x_names.iter().cloned().collect();

    // With no self reference there is no good identity; an update that just
    // assigns a value is rejected.
    if !exprs.iter().any(|e| expr_uses_vars(e, &x_set)) {
        tracing::debug!(?x_names, "update does not reference its accumulator");
        return Ok(None);
    }

    if let ([update], [x]) = (exprs, x_names) {
        if update.as_variable() == Some(x) {
            tracing::debug!(%x, "self assignment");
            return Ok(Some(AssociativeOp {
                pattern: AssociativePattern {
                    ops: SmallVec::from_elem(update.clone(), 1),
                    identities: SmallVec::from_elem(strand_ir::op::make_zero(update.ty()), 1),
                    is_commutative: true,
                },
                xs: SmallVec::from_elem(x.clone(), 1),
                ys: SmallVec::new(),
                constants: SmallVec::new(),
            }));
        }
    }

    let table = cache.get_ops_table(exprs)?;
    for (index, pattern) in table.iter().enumerate() {
        if let Some(found) = try_pattern(pattern, exprs, x_names, &x_set) {
            tracing::debug!(index, pattern = %found.pattern, "associative pattern matched");
            return Ok(Some(found));
        }
    }
    tracing::debug!(candidates = table.len(), "no associative pattern matched");
    Ok(None)
}

/// Bindings of one component, if they satisfy the placeholder constraints.
fn component_bindings(
    op: &Expr,
    expr: &Expr,
    x_names: &[Name],
    x_set: &FxHashSet<Name>,
) -> Option<Bindings> {
    let mut bindings = Bindings::default();
    if !expr_match(op, expr, &mut bindings) {
        return None;
    }
    for (j, x) in x_names.iter().enumerate() {
        if let Some(bound) = bindings.get(&x_placeholder(j)) {
            if bound.as_variable() != Some(x) {
                tracing::trace!(expected = %x, got = %bound, "x part differs");
                return None;
            }
        }
        if let Some(bound) = bindings.get(&y_placeholder(j)) {
            if expr_uses_vars(bound, x_set) {
                tracing::trace!(y = %bound, "y part depends on an accumulator");
                return None;
            }
        }
        if let Some(bound) = bindings.get(&k_placeholder(j)) {
            if !is_const(bound) {
                tracing::trace!(k = %bound, "k part is not constant");
                return None;
            }
        }
    }
    Some(bindings)
}

fn try_pattern(
    pattern: &AssociativePattern,
    exprs: &[Expr],
    x_names: &[Name],
    x_set: &FxHashSet<Name>,
) -> Option<AssociativeOp> {
    let mut merged = Bindings::default();
    for (op, expr) in pattern.ops.iter().zip(exprs) {
        for (name, bound) in component_bindings(op, expr, x_names, x_set)? {
            match merged.get(&name) {
                Some(previous) if !graph_equal(previous, &bound) => return None,
                Some(_) => {}
                None => {
                    merged.insert(name, bound);
                }
            }
        }
    }

    let mut ys = SmallVec::new();
    let mut renames = FxHashMap::default();
    for (j, x) in x_names.iter().enumerate() {
        let y_part = merged.get(&y_placeholder(j))?.clone();
        let y = y_name(x);
        renames.insert(y_placeholder(j), Expr::var(y_part.ty(), y.clone()));
        ys.push((y, y_part));
        let x_var = Expr::var(exprs[j].ty(), x.clone());
        renames.insert(x_placeholder(j), x_var);
    }
    let mut constants: SmallVec<[(Name, Expr); 1]> = merged
        .iter()
        .filter(|(name, _)| name.as_str().starts_with('k'))
        .map(|(name, bound)| (name.clone(), bound.clone()))
        .collect();
    constants.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, bound) in &constants {
        renames.insert(name.clone(), bound.clone());
    }

    let mut rename = Substitute::new(renames);
    let ops = pattern.ops.iter().map(|op| rename.mutate_expr(op)).collect();

    Some(AssociativeOp {
        pattern: AssociativePattern {
            ops,
            identities: pattern.identities.clone(),
            is_commutative: pattern.is_commutative,
        },
        xs: x_names.iter().cloned().collect(),
        ys,
        constants,
    })
}
