#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use super::*;

fn int(name: &str) -> Expr {
    Expr::var(Type::int(32), name)
}

fn load(buffer: &str, index: Expr) -> Expr {
    Expr::load(Type::int(32), buffer, index)
}

fn locked(producer: &str, indices: Vec<Expr>, tuple_size: usize, body: Stmt) -> Stmt {
    Stmt::atomic(Atomic {
        producer_name: Name::new(producer),
        mutex_name: Name::new(&format!("{producer}.mutex")),
        mutex_indices: indices,
        tuple_size,
        dimensions: 1,
        body,
    })
}

/// `f[r] = (let t = f[r] in t + 1)`
fn hidden_read_update() -> Stmt {
    let r = int("r");
    let value = Expr::let_in("t", load("f", r.clone()), int("t") + 1);
    Stmt::store("f", value, r)
}

/// `f[r] = f[r] + 1`
fn direct_read_update() -> Stmt {
    let r = int("r");
    Stmt::store("f", load("f", r.clone()) + 1, r)
}

fn names(set: &FxHashSet<Name>) -> Vec<String> {
    let mut out: Vec<String> = set.iter().map(ToString::to_string).collect();
    out.sort();
    out
}

// ── Shared queries ──────────────────────────────────────────────────

#[test]
fn store_names_cover_every_branch() {
    let body = Stmt::sequence([
        Stmt::store("f.0", Expr::from(1), Expr::from(0)),
        Stmt::if_then_else(
            op::const_true(1),
            Stmt::store("f.1", Expr::from(2), Expr::from(0)),
            Some(Stmt::store("g", Expr::from(3), Expr::from(0))),
        ),
    ]);
    assert_eq!(names(&collect_store_names(&body)), ["f.0", "f.1", "g"]);
}

/// Nest `bindings` as let statements around `body`, outermost first.
fn let_stmts(bindings: &[(&str, Expr)], body: Stmt) -> Stmt {
    bindings
        .iter()
        .rev()
        .fold(body, |body, (name, value)| Stmt::let_stmt(*name, value.clone(), body))
}

fn bind<R>(
    host: &mut StoreIndexCheck<'_>,
    bindings: &[(&str, Expr)],
    body: impl FnOnce(&mut Scope<bool>) -> R,
) -> R {
    match bindings.split_first() {
        Some(((name, value), rest)) => {
            let reads = loads_through_lets(value, &mut host.lets, host.buffers);
            host.with_binding(&Name::new(name), reads, |host| bind(host, rest, body))
        }
        None => body(&mut host.lets),
    }
}

/// Run `body` with `bindings` in scope, outermost first, each resolved
/// against `buffers` where it is bound.
fn with_lets<R>(
    buffers: &FxHashSet<Name>,
    bindings: &[(&str, Expr)],
    body: impl FnOnce(&mut Scope<bool>) -> R,
) -> R {
    let mut host = StoreIndexCheck {
        lets: Scope::new(),
        buffers,
        found: false,
    };
    bind(&mut host, bindings, body)
}

fn buffer_f() -> FxHashSet<Name> {
    [Name::new("f")].into_iter().collect()
}

#[test]
fn loads_are_followed_through_let_chains() {
    let buffers = buffer_f();
    // a = f[0]; b = a + 1
    let bindings = [("a", load("f", Expr::from(0))), ("b", int("a") + 1)];
    let found = with_lets(&buffers, &bindings, |lets| {
        loads_through_lets(&(int("b") * 2), lets, &buffers)
    });
    assert!(found);
    assert!(!loads_through_lets(&int("b"), &mut Scope::new(), &buffers));
    assert!(loads_through_lets(&load("f", Expr::from(1)), &mut Scope::new(), &buffers));
}

#[test]
fn self_shadowing_let_terminates() {
    let buffers = buffer_f();
    let found = with_lets(&buffers, &[("t", int("t") + 1)], |lets| {
        loads_through_lets(&int("t"), lets, &buffers)
    });
    assert!(!found);
}

#[test]
fn bound_values_resolve_in_their_own_scope() {
    let buffers = buffer_f();
    // u = f[0]; t = u + 1; u = 0
    let bindings = [
        ("u", load("f", Expr::from(0))),
        ("t", int("u") + 1),
        ("u", Expr::from(0)),
    ];
    let (t, u) = with_lets(&buffers, &bindings, |lets| {
        (
            loads_through_lets(&int("t"), lets, &buffers),
            loads_through_lets(&int("u"), lets, &buffers),
        )
    });
    assert!(t);
    assert!(!u);
}

#[test]
fn inner_let_shadows_a_reading_binding() {
    let buffers = buffer_f();
    // u = f[0] outside; `let u = 0 in u + 1` inside
    let inner = Expr::let_in("u", Expr::from(0), int("u") + 1);
    let shadowed = with_lets(&buffers, &[("u", load("f", Expr::from(0)))], |lets| {
        loads_through_lets(&inner, lets, &buffers)
    });
    assert!(!shadowed);

    // The same variable node outside the inner let still reads.
    let u = int("u");
    let both = Expr::let_in("u", Expr::from(0), u.clone()) + u;
    let found = with_lets(&buffers, &[("u", load("f", Expr::from(0)))], |lets| {
        loads_through_lets(&both, lets, &buffers)
    });
    assert!(found);
}

// ── Validity ────────────────────────────────────────────────────────

#[test]
fn index_reading_the_updated_buffer_is_rejected() {
    // f[clamp(f[r], 0, 100)] = f[r] + 1
    let r = int("r");
    let index = op::max(op::min(load("f", r.clone()), Expr::from(100)), Expr::from(0));
    let store = Stmt::store("f", load("f", r) + 1, index);
    let stmt = Stmt::producer("f", locked("f", Vec::new(), 1, store));
    assert_eq!(
        check_atomic_validity(&stmt),
        Err(IrError::SelfReferentialAtomicIndex {
            producer: Name::new("f"),
        })
    );
}

#[test]
fn index_reading_through_let_stmt_is_rejected() {
    let r = int("r");
    let store = Stmt::store("f", load("f", r.clone()) + 1, int("i"));
    let body = Stmt::let_stmt("i", load("f", r), store);
    let stmt = Stmt::atomic_unlocked("f", 1, 1, body);
    assert!(check_atomic_validity(&stmt).is_err());
}

#[test]
fn later_shadowing_does_not_hide_an_index_read() {
    // let u = f[r]; let t = u; let u = 0; f[t] = 1
    let body = let_stmts(
        &[("u", load("f", int("r"))), ("t", int("u")), ("u", Expr::from(0))],
        Stmt::store("f", Expr::from(1), int("t")),
    );
    let stmt = locked("f", Vec::new(), 1, body);
    assert_eq!(
        check_atomic_validity(&stmt),
        Err(IrError::SelfReferentialAtomicIndex {
            producer: Name::new("f"),
        })
    );
}

#[test]
fn shadowed_reading_index_is_valid() {
    // let t = f[r]; let t = 0; f[t] = 1
    let body = let_stmts(
        &[("t", load("f", int("r"))), ("t", Expr::from(0))],
        Stmt::store("f", Expr::from(1), int("t")),
    );
    assert_eq!(check_atomic_validity(&locked("f", Vec::new(), 1, body)), Ok(()));

    // let i = f[r]; f[let i = 0 in i] = 1
    let index = Expr::let_in("i", Expr::from(0), int("i"));
    let body = Stmt::let_stmt("i", load("f", int("r")), Stmt::store("f", Expr::from(1), index));
    assert_eq!(check_atomic_validity(&locked("f", Vec::new(), 1, body)), Ok(()));
}

#[test]
fn index_reading_other_buffers_is_valid() {
    let r = int("r");
    let store = Stmt::store("f", load("f", r.clone()) + 1, load("g", r));
    let stmt = locked("f", Vec::new(), 1, store);
    assert_eq!(check_atomic_validity(&stmt), Ok(()));
}

// ── Stage 1 ─────────────────────────────────────────────────────────

#[test]
fn direct_read_needs_no_mutex() {
    let stmt = locked("f", vec![int("r")], 1, direct_read_update());
    let (out, elided) = remove_unnecessary_mutex_use(&stmt);
    let atomic = out.as_atomic().unwrap();
    assert!(!atomic.needs_mutex());
    assert!(atomic.mutex_indices.is_empty());
    assert!(atomic.body.same_as(&stmt.as_atomic().unwrap().body));
    assert_eq!(names(&elided), ["f.mutex"]);
}

#[test]
fn read_behind_let_keeps_the_mutex() {
    let stmt = locked("f", vec![int("r")], 1, hidden_read_update());
    let (out, elided) = remove_unnecessary_mutex_use(&stmt);
    assert!(out.same_as(&stmt));
    assert!(elided.is_empty());
}

#[test]
fn read_behind_let_stmt_keeps_the_mutex() {
    let r = int("r");
    let body = Stmt::let_stmt(
        "t",
        load("f", r.clone()),
        Stmt::store("f", int("t") + 1, r),
    );
    let stmt = locked("f", Vec::new(), 1, body);
    let (out, _) = remove_unnecessary_mutex_use(&stmt);
    assert!(out.as_atomic().unwrap().needs_mutex());
}

#[test]
fn later_shadowing_does_not_hide_a_value_read() {
    // let u = f[r]; let t = u + 1; let u = 0; f[r] = t
    let body = let_stmts(
        &[
            ("u", load("f", int("r"))),
            ("t", int("u") + 1),
            ("u", Expr::from(0)),
        ],
        Stmt::store("f", int("t"), int("r")),
    );
    let stmt = locked("f", vec![int("r")], 1, body);
    let (out, elided) = remove_unnecessary_mutex_use(&stmt);
    assert!(out.as_atomic().unwrap().needs_mutex());
    assert!(elided.is_empty());
}

#[test]
fn rebinding_decides_by_the_innermost_let() {
    // let t = f[r]; let t = 0; f[r] = t + 1
    let shadowed = let_stmts(
        &[("t", load("f", int("r"))), ("t", Expr::from(0))],
        Stmt::store("f", int("t") + 1, int("r")),
    );
    let (out, _) = remove_unnecessary_mutex_use(&locked("f", Vec::new(), 1, shadowed));
    assert!(!out.as_atomic().unwrap().needs_mutex());

    // let t = 0; let t = f[r]; f[r] = t + 1
    let revealed = let_stmts(
        &[("t", Expr::from(0)), ("t", load("f", int("r")))],
        Stmt::store("f", int("t") + 1, int("r")),
    );
    let (out, _) = remove_unnecessary_mutex_use(&locked("f", Vec::new(), 1, revealed));
    assert!(out.as_atomic().unwrap().needs_mutex());

    // f[r] = (let t = f[r] in let t = 0 in t + 1)
    let value = Expr::let_in(
        "t",
        load("f", int("r")),
        Expr::let_in("t", Expr::from(0), int("t") + 1),
    );
    let inner = Stmt::store("f", value, int("r"));
    let (out, _) = remove_unnecessary_mutex_use(&locked("f", Vec::new(), 1, inner));
    assert!(!out.as_atomic().unwrap().needs_mutex());
}

#[test]
fn let_bound_index_alone_needs_no_mutex() {
    // The temporary only feeds the index, never a stored value.
    let body = Stmt::let_stmt(
        "t",
        load("g", int("r")),
        Stmt::store("f", load("f", int("t")) + 1, int("t")),
    );
    let stmt = locked("f", Vec::new(), 1, body);
    let (out, elided) = remove_unnecessary_mutex_use(&stmt);
    assert!(!out.as_atomic().unwrap().needs_mutex());
    assert_eq!(elided.len(), 1);
}

#[test]
fn tuple_components_count_as_one_region() {
    // f.1[r] = (let t = f.0[r] in t + f.1[r])
    let r = int("r");
    let value = Expr::let_in("t", load("f.0", r.clone()), int("t") + load("f.1", r.clone()));
    let body = Stmt::sequence([
        Stmt::store("f.0", load("f.0", r.clone()) + 1, r.clone()),
        Stmt::store("f.1", value, r),
    ]);
    let stmt = locked("f", Vec::new(), 2, body);
    let (out, _) = remove_unnecessary_mutex_use(&stmt);
    assert!(out.as_atomic().unwrap().needs_mutex());
}

// ── Stage 2 ─────────────────────────────────────────────────────────

#[test]
fn tuple_producers_read_shape_from_first_component() {
    assert_eq!(shape_buffer(&Name::new("f"), 1).as_str(), "f");
    assert_eq!(shape_buffer(&Name::new("f"), 3).as_str(), "f.0");
}

#[test]
fn allocation_mirrors_min_and_stride() {
    let domain = LockDomain {
        mutex: Name::new("f.mutex"),
        tuple_size: 1,
        dimensions: 2,
    };
    let body = Stmt::evaluate(Expr::from(0));
    let alloc_stmt = mutex_allocation(&domain, &Name::new("f"), body.clone());
    let alloc = alloc_stmt.as_allocate().unwrap();

    assert_eq!(alloc.name.as_str(), "f.mutex");
    assert_eq!(alloc.ty, MUTEX_ARRAY);
    assert_eq!(alloc.memory_type, MemoryType::Stack);
    assert!(alloc.extents.is_empty());
    assert_eq!(
        alloc.free_function.as_ref().map(Name::as_str),
        Some(MUTEX_ARRAY_DESTROY)
    );
    let count = int("f.extent.0") * int("f.extent.1");
    let create = Expr::call(MUTEX_ARRAY, MUTEX_ARRAY_CREATE, [count], CallType::Extern);
    assert_eq!(alloc.new_expr, Some(create));

    let mut bound = Vec::new();
    let mut cursor = alloc.body.clone();
    while let StmtKind::LetStmt { name, value, body } = cursor.kind() {
        bound.push(format!("{name} = {value}"));
        let next = body.clone();
        cursor = next;
    }
    assert_eq!(
        bound,
        [
            "f.mutex.min.0 = f.min.0",
            "f.mutex.stride.0 = f.stride.0",
            "f.mutex.min.1 = f.min.1",
            "f.mutex.stride.1 = f.stride.1",
        ]
    );
    assert!(cursor.same_as(&body));
}

#[test]
fn zero_dimensional_producers_get_one_mutex() {
    let domain = LockDomain {
        mutex: Name::new("s.mutex"),
        tuple_size: 1,
        dimensions: 0,
    };
    let alloc_stmt = mutex_allocation(&domain, &Name::new("s"), Stmt::evaluate(Expr::from(0)));
    let create = Expr::call(
        MUTEX_ARRAY,
        MUTEX_ARRAY_CREATE,
        [Expr::from(1)],
        CallType::Extern,
    );
    assert_eq!(alloc_stmt.as_allocate().unwrap().new_expr, Some(create));
}

#[test]
fn elided_regions_do_not_join_the_mutex_check() {
    let body = Stmt::sequence([
        Stmt::atomic_unlocked("f", 1, 1, direct_read_update()),
        locked("f", Vec::new(), 1, hidden_read_update()),
    ]);
    let domain = lock_domain(&Name::new("f"), &body).unwrap().unwrap();
    assert_eq!(domain.mutex.as_str(), "f.mutex");
}

#[test]
fn unlocked_producers_have_no_domain() {
    let body = Stmt::atomic_unlocked("f", 1, 1, direct_read_update());
    assert!(lock_domain(&Name::new("f"), &body).unwrap().is_none());
}

#[test]
fn regions_of_other_producers_are_ignored() {
    let body = Stmt::sequence([
        locked("f", Vec::new(), 1, hidden_read_update()),
        locked("g", Vec::new(), 2, hidden_read_update()),
    ]);
    assert!(lock_domain(&Name::new("f"), &body).is_ok());
}

#[test]
fn dimension_mismatch_is_inconsistent() {
    let mut flat = locked("f", Vec::new(), 1, hidden_read_update())
        .as_atomic()
        .unwrap()
        .clone();
    flat.dimensions = 3;
    let body = Stmt::sequence([
        locked("f", Vec::new(), 1, hidden_read_update()),
        Stmt::atomic(flat),
    ]);
    let err = lock_domain(&Name::new("f"), &body).err().unwrap();
    assert!(err.is_internal());
    assert!(matches!(
        err,
        IrError::InconsistentAtomic {
            field: "dimensions",
            ..
        }
    ));
}

#[test]
fn lock_outside_its_producer_is_a_bug() {
    let stmt = locked("f", Vec::new(), 1, hidden_read_update());
    let err = synthesize_mutexes(&stmt).err().unwrap();
    assert_eq!(
        err,
        IrError::UnallocatedMutex {
            producer: Name::new("f"),
            mutex: Name::new("f.mutex"),
        }
    );
}

#[test]
fn multiple_indices_lock_the_whole_buffer() {
    let update = hidden_read_update();
    let region = locked("f", vec![int("x"), int("y")], 1, update.clone());
    let (out, allocated) = synthesize_mutexes(&Stmt::producer("f", region)).unwrap();
    assert_eq!(allocated, [Name::new("f.mutex")]);

    let mut locks = Vec::new();
    let mut finder = CollectAtomics(&mut locks);
    finder.include_stmt(&out);
    let [atomic] = locks.as_slice() else {
        panic!("expected one atomic region, got {}", locks.len());
    };
    let steps = atomic.body.flatten_blocks();
    assert_eq!(steps.len(), 3);
    let mutex = Name::new("f.mutex");
    assert_eq!(steps[0], mutex_call(MUTEX_ARRAY_LOCK, &mutex, Expr::from(0)));
    assert!(steps[1].same_as(&update));
    assert_eq!(steps[2], mutex_call(MUTEX_ARRAY_UNLOCK, &mutex, Expr::from(0)));
}

struct CollectAtomics<'a>(&'a mut Vec<Atomic>);

impl IrVisitor for CollectAtomics<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Some(atomic) = stmt.as_atomic() {
            self.0.push(atomic.clone());
        }
        walk_stmt(self, stmt);
    }
}
