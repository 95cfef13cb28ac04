#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;
use strand_ir::{graph_equal, Severity};

use super::*;

const NUMERIC: [Type; 10] = [
    Type::int(8),
    Type::int(16),
    Type::int(32),
    Type::int(64),
    Type::uint(8),
    Type::uint(16),
    Type::uint(32),
    Type::uint(64),
    Type::float(32),
    Type::float(64),
];

fn acc(ty: Type) -> Expr {
    Expr::var(ty, "acc")
}

fn val(ty: Type) -> Expr {
    Expr::var(ty, "val")
}

fn lookup(exprs: &[Expr]) -> Arc<[AssociativePattern]> {
    OpsTableCache::new().get_ops_table(exprs).unwrap()
}

#[test]
fn add_has_one_commutative_pattern_with_zero_identity() {
    for ty in NUMERIC {
        let table = lookup(&[acc(ty) + val(ty)]);
        assert_eq!(table.len(), 1, "{ty}");
        assert!(table[0].is_commutative);
        assert!(graph_equal(&table[0].identities[0], &op::make_zero(ty)), "{ty}");
        assert!(graph_equal(&table[0].ops[0], &(Slot::new(ty, 0).x + Slot::new(ty, 0).y)));
    }
}

#[test]
fn mul_identity_is_one() {
    for ty in NUMERIC {
        let table = lookup(&[acc(ty) * val(ty)]);
        assert_eq!(table.len(), 1, "{ty}");
        assert!(table[0].is_commutative);
        assert!(graph_equal(&table[0].identities[0], &op::make_one(ty)), "{ty}");
    }
}

#[test]
fn min_and_max_identities_are_type_extremes() {
    for ty in NUMERIC {
        let max = lookup(&[op::max(acc(ty), val(ty))]);
        assert!(graph_equal(&max[0].identities[0], &ty.min()), "{ty}");
        let min = lookup(&[op::min(acc(ty), val(ty))]);
        assert!(graph_equal(&min[0].identities[0], &ty.max()), "{ty}");
    }
}

#[test]
fn sub_has_no_single_pattern() {
    for ty in NUMERIC {
        assert!(lookup(&[acc(ty) - val(ty)]).is_empty(), "{ty}");
    }
}

#[test]
fn arity_above_two_is_empty() {
    let ty = Type::int(32);
    let e = acc(ty) + val(ty);
    assert!(lookup(&[e.clone(), e.clone(), e]).is_empty());
}

#[test]
fn empty_input_is_internal_error() {
    let err = OpsTableCache::new().get_ops_table(&[]).unwrap_err();
    assert_eq!(err, IrError::EmptyReductionTuple);
    assert_eq!(err.severity(), Severity::Internal);
}

#[test]
fn mismatched_types_are_user_error() {
    let a = acc(Type::int(32)) + val(Type::int(32));
    let b = acc(Type::float(32)) + val(Type::float(32));
    let err = OpsTableCache::new().get_ops_table(&[a, b]).unwrap_err();
    assert_eq!(err.severity(), Severity::User);
    assert!(matches!(err, IrError::MismatchedTupleTypes { index: 1, .. }));
}

#[test]
fn unknown_roots_vectors_and_handles_are_empty() {
    let ty = Type::int(32);
    assert!(lookup(&[acc(ty) / val(ty)]).is_empty());
    assert!(lookup(&[acc(ty)]).is_empty());

    let vec = ty.with_lanes(4);
    assert!(lookup(&[acc(vec) + val(vec)]).is_empty());

    let handle = Type::handle("buffer");
    let call = Expr::call(handle, "make", [acc(handle)], strand_ir::CallType::Extern);
    assert!(lookup(&[call]).is_empty());
}

#[test]
fn bool_buckets_recognize_and_or() {
    let b = Type::bool();
    let and = lookup(&[op::and(acc(b), val(b))]);
    assert_eq!(and.len(), 1);
    assert!(graph_equal(&and[0].identities[0], &op::const_true(1)));
    let or = lookup(&[op::or(acc(b), val(b))]);
    assert_eq!(or.len(), 1);
    assert!(graph_equal(&or[0].identities[0], &op::const_false(1)));
}

#[test]
fn unsigned_buckets_add_saturating_patterns() {
    let any_cast = |ty: Type| op::cast(ty, acc(Type::uint(64)) + val(Type::uint(64)));
    assert_eq!(lookup(&[any_cast(Type::uint(8))]).len(), 3);
    assert_eq!(lookup(&[any_cast(Type::uint(16))]).len(), 2);
    assert_eq!(lookup(&[any_cast(Type::uint(32))]).len(), 1);
    assert!(lookup(&[any_cast(Type::uint(64))]).is_empty());

    for bits in [8, 16, 32] {
        let ty = Type::uint(bits);
        let sel = op::select(op::lt(acc(ty), val(ty)), acc(ty), val(ty));
        assert_eq!(lookup(&[sel]).len(), 2, "{ty}");
    }
}

#[test]
fn signed_buckets_carry_only_generic_patterns() {
    for bits in [8, 16, 32, 64] {
        let ty = Type::int(bits);
        let sel = op::select(op::lt(acc(ty), val(ty)), acc(ty), val(ty));
        assert!(lookup(&[sel]).is_empty(), "{ty}");
        let cast = op::cast(ty, acc(Type::int(64)));
        assert!(lookup(&[cast]).is_empty(), "{ty}");
    }
}

#[test]
fn float_buckets_have_nan_propagating_selects() {
    for ty in [Type::float(16), Type::float(32), Type::float(64)] {
        let sel = op::select(op::lt(acc(ty), val(ty)), acc(ty), val(ty));
        let table = lookup(&[sel]);
        assert_eq!(table.len(), 4, "{ty}");
        assert!(graph_equal(&table[0].identities[0], &ty.min()));
        assert!(graph_equal(&table[3].identities[0], &ty.max()));
    }
}

#[test]
fn pairs_have_payload_and_complex_patterns() {
    let ty = Type::int(32);
    let max = op::max(acc(ty), val(ty));
    let table = lookup(&[max.clone(), max]);
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].arity(), 2);
    assert!(graph_equal(&table[0].identities[1], &op::make_zero(ty)));

    let sub = acc(ty) * val(ty) - acc(ty) * val(ty);
    let table = lookup(&[sub.clone(), sub]);
    assert_eq!(table.len(), 2);
    assert!(graph_equal(&table[0].identities[0], &op::make_one(ty)));

    let add = acc(ty) + val(ty);
    assert!(lookup(&[add.clone(), add]).is_empty());
}

#[test]
fn tables_are_cached_per_concrete_key() {
    let cache = OpsTableCache::new();
    assert!(cache.is_empty());
    let e32 = acc(Type::int(32)) + val(Type::int(32));
    let first = cache.get_ops_table(&[e32.clone()]).unwrap();
    let second = cache.get_ops_table(&[e32]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    let e16 = acc(Type::int(16)) + val(Type::int(16));
    cache.get_ops_table(&[e16]).unwrap();
    assert_eq!(cache.len(), 2);
}

#[test]
fn cache_can_be_shared_across_threads() {
    let cache = OpsTableCache::new();
    std::thread::scope(|scope| {
        for bits in [8, 16, 32, 64] {
            let cache = &cache;
            scope.spawn(move || {
                let ty = Type::uint(bits);
                let table = cache.get_ops_table(&[acc(ty) + val(ty)]).unwrap();
                assert_eq!(table.len(), 1);
            });
        }
    });
    assert_eq!(cache.len(), 4);
}
