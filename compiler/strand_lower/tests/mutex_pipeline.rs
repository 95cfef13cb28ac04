//! End-to-end tests for mutex synthesis over lowered pipelines.

#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;
use strand_ir::{
    walk_stmt, Atomic, CallType, Expr, ExprKind, ForType, IrError, IrVisitor, MemoryType, Name,
    Severity, Stmt, StmtKind, Type,
};
use strand_lower::mutex::{MUTEX_ARRAY_CREATE, MUTEX_ARRAY_LOCK, MUTEX_ARRAY_UNLOCK};
use strand_lower::{add_atomic_mutex, init_tracing, LowerContext, LowerOptions};

fn int(name: &str) -> Expr {
    Expr::var(Type::int(32), name)
}

fn load(buffer: &str, index: Expr) -> Expr {
    Expr::load(Type::int(32), buffer, index)
}

/// `produce f { parallel (r, 0, 100) { atomic (f.mutex, r) { <update> } } }`
fn pipeline(update: Stmt, tuple_size: usize, dimensions: usize) -> Stmt {
    let region = Stmt::atomic(Atomic {
        producer_name: Name::new("f"),
        mutex_name: Name::new("f.mutex"),
        mutex_indices: vec![int("r")],
        tuple_size,
        dimensions,
        body: update,
    });
    let lanes = Stmt::for_loop("r", Expr::from(0), Expr::from(100), ForType::Parallel, region);
    Stmt::producer("f", lanes)
}

/// Every node of interest in a lowered statement.
#[derive(Default)]
struct Inventory {
    allocations: Vec<Stmt>,
    atomics: Vec<Atomic>,
    calls: Vec<String>,
}

impl IrVisitor for Inventory {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt.kind() {
            StmtKind::Allocate(_) => self.allocations.push(stmt.clone()),
            StmtKind::Atomic(atomic) => self.atomics.push(atomic.clone()),
            StmtKind::Evaluate(value) => {
                if let ExprKind::Call { name, .. } = value.kind() {
                    self.calls.push(name.to_string());
                }
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }
}

fn inventory(stmt: &Stmt) -> Inventory {
    let mut inventory = Inventory::default();
    inventory.include_stmt(stmt);
    inventory
}

#[test]
fn direct_update_is_emitted_without_locks() {
    init_tracing();
    let r = int("r");
    let update = Stmt::store("f", load("f", r.clone()) + 1, r);
    let input = pipeline(update.clone(), 1, 1);

    let out = add_atomic_mutex(&LowerContext::default(), &input).unwrap();

    assert!(out.elided.contains("f.mutex"));
    assert!(out.allocated.is_empty());
    let found = inventory(&out.stmt);
    assert!(found.allocations.is_empty());
    assert!(found.calls.is_empty());
    let [atomic] = found.atomics.as_slice() else {
        panic!("expected one atomic region");
    };
    assert!(!atomic.needs_mutex());
    assert!(atomic.body.same_as(&update));
}

#[test]
fn hidden_read_is_locked_around_the_original_update() {
    init_tracing();
    let r = int("r");
    let value = Expr::let_in("t", load("f", r.clone()), int("t") + 1);
    let update = Stmt::store("f", value, r.clone());
    let input = pipeline(update.clone(), 1, 2);

    let out = add_atomic_mutex(&LowerContext::default(), &input).unwrap();
    assert!(out.elided.is_empty());
    assert_eq!(out.allocated, [Name::new("f.mutex")]);

    // produce f { allocate f.mutex ... { let f.mutex.min.0 = ... } }
    let StmtKind::ProducerConsumer {
        is_producer: true,
        body,
        ..
    } = out.stmt.kind()
    else {
        panic!("producer was not kept at the root:\n{}", out.stmt);
    };
    let alloc = body.as_allocate().unwrap();
    assert_eq!(alloc.memory_type, MemoryType::Stack);
    let count = int("f.extent.0") * int("f.extent.1");
    let mutex_array = Type::handle("mutex_array");
    assert_eq!(
        alloc.new_expr,
        Some(Expr::call(
            mutex_array,
            MUTEX_ARRAY_CREATE,
            [count],
            CallType::Extern
        ))
    );
    let printed = out.stmt.to_string();
    for binding in [
        "let f.mutex.min.0 = f.min.0",
        "let f.mutex.stride.0 = f.stride.0",
        "let f.mutex.min.1 = f.min.1",
        "let f.mutex.stride.1 = f.stride.1",
    ] {
        assert!(printed.contains(binding), "missing `{binding}` in:\n{printed}");
    }

    let found = inventory(&out.stmt);
    assert_eq!(found.allocations.len(), 1);
    assert_eq!(found.calls, [MUTEX_ARRAY_LOCK, MUTEX_ARRAY_UNLOCK]);
    let [atomic] = found.atomics.as_slice() else {
        panic!("expected one atomic region");
    };
    assert!(atomic.needs_mutex());
    let steps = atomic.body.flatten_blocks();
    assert_eq!(steps.len(), 3);
    assert!(steps[1].same_as(&update));
    let array = Expr::var(mutex_array, "f.mutex");
    let lock = Expr::call(
        Type::int(32),
        MUTEX_ARRAY_LOCK,
        [array.clone(), r.clone()],
        CallType::Extern,
    );
    let unlock = Expr::call(Type::int(32), MUTEX_ARRAY_UNLOCK, [array, r], CallType::Extern);
    assert_eq!(steps[0], Stmt::evaluate(lock));
    assert_eq!(steps[2], Stmt::evaluate(unlock));
}

#[test]
fn shadowed_temporary_still_locks() {
    // let u = f[r]; let t = u + 1; let u = 0; f[r] = t + 1
    let r = int("r");
    let store = Stmt::store("f", int("t") + 1, r.clone());
    let update = Stmt::let_stmt(
        "u",
        load("f", r),
        Stmt::let_stmt(
            "t",
            int("u") + 1,
            Stmt::let_stmt("u", Expr::from(0), store),
        ),
    );

    let out = add_atomic_mutex(&LowerContext::default(), &pipeline(update, 1, 1)).unwrap();
    assert!(out.elided.is_empty());
    assert_eq!(inventory(&out.stmt).calls, [MUTEX_ARRAY_LOCK, MUTEX_ARRAY_UNLOCK]);
}

#[test]
fn disabled_elision_locks_every_region() {
    let r = int("r");
    let update = Stmt::store("f", load("f", r.clone()) + 1, r);
    let options = LowerOptions {
        elide_unneeded_mutexes: false,
        ..LowerOptions::default()
    };

    let out = add_atomic_mutex(&LowerContext::new(options), &pipeline(update, 1, 1)).unwrap();
    assert!(out.elided.is_empty());
    assert_eq!(inventory(&out.stmt).calls, [MUTEX_ARRAY_LOCK, MUTEX_ARRAY_UNLOCK]);
}

#[test]
fn tuple_size_mismatch_is_an_internal_error() {
    let hidden = |buffer: &str| {
        let r = int("r");
        let value = Expr::let_in("t", load(buffer, r.clone()), int("t") + 1);
        Stmt::store(buffer, value, r)
    };
    let region = |tuple_size| {
        Stmt::atomic(Atomic {
            producer_name: Name::new("acc"),
            mutex_name: Name::new("acc.mutex"),
            mutex_indices: Vec::new(),
            tuple_size,
            dimensions: 1,
            body: hidden("acc"),
        })
    };
    let input = Stmt::producer("acc", Stmt::sequence([region(1), region(2)]));

    let err = add_atomic_mutex(&LowerContext::default(), &input)
        .err()
        .unwrap();
    assert_eq!(err.severity(), Severity::Internal);
    assert!(matches!(
        err,
        IrError::InconsistentAtomic {
            field: "tuple_size",
            ..
        }
    ));
    assert!(err.to_string().starts_with("internal compiler error:"));
}

#[test]
fn self_referential_index_is_a_user_error() {
    let r = int("r");
    let index = strand_ir::op::max(
        strand_ir::op::min(load("f", r.clone()), Expr::from(100)),
        Expr::from(0),
    );
    let input = pipeline(Stmt::store("f", load("f", r) + 1, index), 1, 1);

    let err = add_atomic_mutex(&LowerContext::default(), &input)
        .err()
        .unwrap();
    assert_eq!(err.severity(), Severity::User);

    let unchecked = LowerOptions {
        validate_atomic_indices: false,
        ..LowerOptions::default()
    };
    assert!(add_atomic_mutex(&LowerContext::new(unchecked), &input).is_ok());
}

#[test]
fn tuple_producer_sizes_the_array_from_its_first_component() {
    let r = int("r");
    let value = Expr::let_in("t", load("f.0", r.clone()), int("t") + load("f.1", r.clone()));
    let update = Stmt::sequence([
        Stmt::store("f.0", load("f.0", r.clone()) + 1, r.clone()),
        Stmt::store("f.1", value, r),
    ]);

    let out = add_atomic_mutex(&LowerContext::default(), &pipeline(update, 2, 1)).unwrap();
    let found = inventory(&out.stmt);
    let alloc = found.allocations[0].as_allocate().unwrap();
    let create = Expr::call(
        Type::handle("mutex_array"),
        MUTEX_ARRAY_CREATE,
        [int("f.0.extent.0")],
        CallType::Extern,
    );
    assert_eq!(alloc.new_expr, Some(create));
}

#[test]
fn consumers_and_other_producers_are_untouched() {
    let r = int("r");
    let store = Stmt::store("g", load("f", r.clone()), r);
    let input = Stmt::sequence([
        Stmt::producer("g", store.clone()),
        Stmt::consumer("f", store),
    ]);

    let out = add_atomic_mutex(&LowerContext::default(), &input).unwrap();
    assert!(out.stmt.same_as(&input));
}
