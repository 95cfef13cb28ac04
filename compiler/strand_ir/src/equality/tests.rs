use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use super::*;
use crate::{op, Atomic, Name, Type};

fn int_var(name: &str) -> Expr {
    Expr::var(Type::int(32), name)
}

fn self_composed(steps: usize) -> Expr {
    let mut e = int_var("x");
    for _ in 0..steps {
        e = &e * &e + &e;
    }
    e
}

#[test]
fn separately_built_trees_are_equal() {
    let a = op::min(int_var("x") + 1, int_var("y"));
    let b = op::min(int_var("x") + 1, int_var("y"));
    assert!(!a.same_as(&b));
    assert!(equal(&a, &b));
    assert!(graph_equal(&a, &b));
    assert_eq!(a, b);
}

#[test]
fn graph_equal_is_fast_on_self_composition() {
    let a = self_composed(100);
    let b = self_composed(100);
    let start = Instant::now();
    assert!(graph_equal(&a, &b));
    assert!(start.elapsed() < Duration::from_secs(5));

    let c = &a * &a + &a;
    assert!(!graph_equal(&c, &b));
    assert!(!graph_equal(&b, &c));
}

#[test]
fn cache_records_hits() {
    let a = self_composed(20);
    let b = self_composed(20);
    let mut cache = IrCompareCache::new(4);
    assert_eq!(cache.capacity(), 16);
    let order = IrComparer::with_cache(&mut cache).compare_expr(&a, &b);
    assert_eq!(order, Ordering::Equal);
    assert!(cache.hits() > 0);
    cache.clear();
    assert_eq!(cache.hits(), 0);
}

#[test]
fn node_kind_orders_before_children() {
    // Add sorts before Mul regardless of operands.
    let add = int_var("z") + int_var("z");
    let mul = Expr::from(0) * Expr::from(0);
    assert_eq!(deep_compare(&add, &mul), Ordering::Less);
    assert_eq!(deep_compare(&mul, &add), Ordering::Greater);
}

#[test]
fn type_orders_before_payload() {
    let narrow = Expr::var(Type::int(16), "b");
    let wide = Expr::var(Type::int(32), "a");
    assert_eq!(deep_compare(&narrow, &wide), Ordering::Less);
}

#[test]
fn undefined_sorts_first() {
    let x = int_var("x");
    let mut cmp = IrComparer::new();
    assert_eq!(cmp.compare_optional(None, None), Ordering::Equal);
    assert_eq!(cmp.compare_optional(None, Some(&x)), Ordering::Less);
    assert_eq!(cmp.compare_optional(Some(&x), None), Ordering::Greater);
}

#[test]
fn floats_use_a_total_order() {
    let nan = Expr::float_imm(Type::float(32), f64::NAN);
    let nan2 = Expr::float_imm(Type::float(32), f64::NAN);
    let one = Expr::from(1.0f32);
    assert!(equal(&nan, &nan2));
    assert_eq!(deep_compare(&one, &nan), Ordering::Less);
}

#[test]
fn expr_keys_deduplicate_structurally() {
    let set: BTreeSet<ExprKey> = [
        int_var("x") + 1,
        int_var("x") + 1,
        int_var("y"),
        int_var("x") * 2,
    ]
    .into_iter()
    .map(ExprKey)
    .collect();
    assert_eq!(set.len(), 3);
}

#[test]
fn expr_keys_order_shared_graphs_quickly() {
    let start = Instant::now();
    let set: BTreeSet<ExprKey> = [self_composed(100), self_composed(100), self_composed(99)]
        .into_iter()
        .map(ExprKey)
        .collect();
    assert_eq!(set.len(), 2);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(
        ExprKey(self_composed(99)).cmp(&ExprKey(self_composed(100))),
        deep_compare(&int_var("x"), &(int_var("x") * int_var("x") + int_var("x"))),
    );
}

#[test]
fn statements_compare_all_fields() {
    let body = || Stmt::store("f", int_var("x"), int_var("i"));
    let atomic = |mutex: &str| {
        Stmt::atomic(Atomic {
            producer_name: Name::new("f"),
            mutex_name: Name::new(mutex),
            mutex_indices: vec![int_var("i")],
            tuple_size: 1,
            dimensions: 1,
            body: body(),
        })
    };
    assert!(stmt_equal(&atomic("f.mutex"), &atomic("f.mutex")));
    assert!(!stmt_equal(&atomic("f.mutex"), &atomic("g.mutex")));

    let with_else = Stmt::if_then_else(op::const_true(1), body(), Some(body()));
    let without_else = Stmt::if_then_else(op::const_true(1), body(), None);
    assert_eq!(
        IrComparer::new().compare_stmt(&without_else, &with_else),
        Ordering::Less
    );
    assert!(graph_stmt_equal(&with_else, &with_else.clone()));
    assert_ne!(with_else, without_else);
}
