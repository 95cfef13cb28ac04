//! Mutex synthesis for atomic reduction updates.
//!
//! Scheduling marks a reduction update as an `Atomic` region and gives it a
//! `mutex_name` whenever the update might not be expressible as a native
//! atomic operation. This pass settles that decision and materializes the
//! locks:
//!
//! 1. **Validity**: the index being written must not read one of the
//!    buffers the region updates. No lock granularity is correct for such
//!    an update, so it is rejected as a usage error.
//! 2. **Elision**: a store whose value only reads the updated buffer
//!    directly can be emitted as a native atomic. The mutex stays only when
//!    the read hides behind a let-bound temporary.
//! 3. **Synthesis**: each producer that still locks gets one mutex array,
//!    allocated on the stack inside the producer, and every locked region is
//!    bracketed by lock and unlock calls.
//!
//! The runtime resolves the extern calls `mutex_array_create(count)`,
//! `mutex_array_destroy(array)`, `mutex_array_lock(array, index)` and
//! `mutex_array_unlock(array, index)`.

use rustc_hash::FxHashSet;
use strand_ir::{
    mutate_stmt_children, op, walk_expr, walk_stmt, Allocate, Atomic, CallType, Expr, ExprKind,
    IrError, IrMutator, IrVisitor, MemoryType, Name, Scope, Scoped, Stmt, StmtKind, Type,
    VisitedNodes,
};

use crate::LowerContext;

/// Opaque runtime type of a mutex array.
pub const MUTEX_ARRAY_TYPE: &str = "mutex_array";
pub const MUTEX_ARRAY_CREATE: &str = "mutex_array_create";
pub const MUTEX_ARRAY_DESTROY: &str = "mutex_array_destroy";
pub const MUTEX_ARRAY_LOCK: &str = "mutex_array_lock";
pub const MUTEX_ARRAY_UNLOCK: &str = "mutex_array_unlock";

const MUTEX_ARRAY: Type = Type::handle(MUTEX_ARRAY_TYPE);

/// Output of [`add_atomic_mutex`].
pub struct MutexSynthesis {
    pub stmt: Stmt,
    /// Mutex names cleared because no update needed them.
    pub elided: FxHashSet<Name>,
    /// Mutex arrays allocated, in allocation order.
    pub allocated: Vec<Name>,
}

/// Elide unneeded mutexes in `stmt`, then allocate and lock the rest.
///
/// # Errors
///
/// - [`IrError::SelfReferentialAtomicIndex`] when an atomic update writes
///   to an index computed from the buffer it updates.
/// - [`IrError::InconsistentAtomic`] when the regions of one producer
///   disagree on `tuple_size`, `dimensions` or `mutex_name`.
/// - [`IrError::UnallocatedMutex`] when a lock is not enclosed by the
///   producer that allocates its mutex array.
#[tracing::instrument(level = "debug", skip_all)]
pub fn add_atomic_mutex(ctx: &LowerContext, stmt: &Stmt) -> Result<MutexSynthesis, IrError> {
    let options = ctx.options();
    if options.validate_atomic_indices {
        check_atomic_validity(stmt)?;
    }
    let (stmt, elided) = if options.elide_unneeded_mutexes {
        remove_unnecessary_mutex_use(stmt)
    } else {
        (stmt.clone(), FxHashSet::default())
    };
    let (stmt, allocated) = synthesize_mutexes(&stmt)?;
    tracing::debug!(
        elided = elided.len(),
        allocated = allocated.len(),
        "mutex synthesis complete"
    );
    Ok(MutexSynthesis {
        stmt,
        elided,
        allocated,
    })
}

// ── Shared queries ──────────────────────────────────────────────────

/// Names of every buffer stored to.
struct StoreNames {
    names: FxHashSet<Name>,
    visited: VisitedNodes,
}

impl IrVisitor for StoreNames {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::Store { name, .. } = stmt.kind() {
            self.names.insert(name.clone());
        } else {
            walk_stmt(self, stmt);
        }
    }

    fn include_expr(&mut self, _expr: &Expr) {}

    fn include_stmt(&mut self, stmt: &Stmt) {
        if self.visited.first_visit_stmt(stmt) {
            self.visit_stmt(stmt);
        }
    }
}

fn collect_store_names(body: &Stmt) -> FxHashSet<Name> {
    let mut collector = StoreNames {
        names: FxHashSet::default(),
        visited: VisitedNodes::default(),
    };
    collector.include_stmt(body);
    collector.names
}

/// Finds a load from `buffers`, directly or through a variable bound to a
/// value that loads from them.
///
/// `lets` records for each enclosing let whether its value reads `buffers`,
/// resolved in the scope of the let itself. Lets inside `expr` are bound to
/// `false` once their value is known not to read.
struct LoadsThroughLets<'a> {
    lets: &'a mut Scope<bool>,
    buffers: &'a FxHashSet<Name>,
    found: bool,
    inner_lets: usize,
    visited: VisitedNodes,
}

impl Scoped for LoadsThroughLets<'_> {
    type Binding = bool;

    fn scope(&mut self) -> &mut Scope<bool> {
        self.lets
    }
}

impl IrVisitor for LoadsThroughLets<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::Load { name, .. } if self.buffers.contains(name) => self.found = true,
            ExprKind::Variable(name) => {
                if self.lets.get(name) == Some(&true) {
                    self.found = true;
                }
            }
            ExprKind::Let { name, value, body } => {
                self.include_expr(value);
                if !self.found {
                    self.inner_lets += 1;
                    self.with_binding(name, false, |this| this.include_expr(body));
                    self.inner_lets -= 1;
                }
            }
            _ => walk_expr(self, expr),
        }
    }

    // A shared node seen under an inner shadowing let may read when seen
    // outside it, so only visits in the outer scope are recorded.
    fn include_expr(&mut self, expr: &Expr) {
        if self.found {
            return;
        }
        if self.inner_lets > 0 || self.visited.first_visit_expr(expr) {
            self.visit_expr(expr);
        }
    }
}

fn loads_through_lets(
    expr: &Expr,
    lets: &mut Scope<bool>,
    buffers: &FxHashSet<Name>,
) -> bool {
    let mut finder = LoadsThroughLets {
        lets,
        buffers,
        found: false,
        inner_lets: 0,
        visited: VisitedNodes::default(),
    };
    finder.include_expr(expr);
    finder.found
}

// ── Validity ────────────────────────────────────────────────────────

/// Whether a store index inside one atomic region reads a buffer the
/// region updates.
struct StoreIndexCheck<'a> {
    lets: Scope<bool>,
    buffers: &'a FxHashSet<Name>,
    found: bool,
}

impl Scoped for StoreIndexCheck<'_> {
    type Binding = bool;

    fn scope(&mut self) -> &mut Scope<bool> {
        &mut self.lets
    }
}

impl IrVisitor for StoreIndexCheck<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.found {
            return;
        }
        match stmt.kind() {
            StmtKind::LetStmt { name, value, body } => {
                let reads = loads_through_lets(value, &mut self.lets, self.buffers);
                self.with_binding(name, reads, |this| this.include_stmt(body));
            }
            StmtKind::Store { name, index, .. } if self.buffers.contains(name) => {
                self.found = loads_through_lets(index, &mut self.lets, self.buffers);
            }
            _ => walk_stmt(self, stmt),
        }
    }

    // Expressions are inspected from the stores.
    fn include_expr(&mut self, _expr: &Expr) {}
}

struct CheckAtomicValidity {
    error: Option<IrError>,
}

impl IrVisitor for CheckAtomicValidity {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.error.is_some() {
            return;
        }
        if let Some(atomic) = stmt.as_atomic() {
            let buffers = collect_store_names(&atomic.body);
            let mut check = StoreIndexCheck {
                lets: Scope::new(),
                buffers: &buffers,
                found: false,
            };
            check.include_stmt(&atomic.body);
            if check.found {
                self.error = Some(IrError::SelfReferentialAtomicIndex {
                    producer: atomic.producer_name.clone(),
                });
                return;
            }
        }
        walk_stmt(self, stmt);
    }

    fn include_expr(&mut self, _expr: &Expr) {}
}

fn check_atomic_validity(stmt: &Stmt) -> Result<(), IrError> {
    let mut check = CheckAtomicValidity { error: None };
    check.include_stmt(stmt);
    match check.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// ── Stage 1: elision ────────────────────────────────────────────────

/// Finds a store value that reads one of `buffers` through a let-bound
/// variable in scope at the store.
struct HiddenLoadFinder<'a> {
    lets: Scope<bool>,
    buffers: &'a FxHashSet<Name>,
    inside_store: bool,
    found: bool,
}

impl Scoped for HiddenLoadFinder<'_> {
    type Binding = bool;

    fn scope(&mut self) -> &mut Scope<bool> {
        &mut self.lets
    }
}

impl IrVisitor for HiddenLoadFinder<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if self.found {
            return;
        }
        match expr.kind() {
            ExprKind::Let { name, value, body } => {
                self.include_expr(value);
                let reads = loads_through_lets(value, &mut self.lets, self.buffers);
                self.with_binding(name, reads, |this| this.include_expr(body));
            }
            ExprKind::Variable(name) => {
                if self.inside_store && self.lets.get(name) == Some(&true) {
                    self.found = true;
                }
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.found {
            return;
        }
        match stmt.kind() {
            StmtKind::LetStmt { name, value, body } => {
                self.include_expr(value);
                let reads = loads_through_lets(value, &mut self.lets, self.buffers);
                self.with_binding(name, reads, |this| this.include_stmt(body));
            }
            StmtKind::Store {
                name,
                value,
                index,
                predicate,
            } => {
                let outer = self.inside_store;
                self.inside_store = self.buffers.contains(name);
                self.include_expr(value);
                self.inside_store = outer;
                self.include_expr(index);
                self.include_expr(predicate);
            }
            _ => walk_stmt(self, stmt),
        }
    }
}

fn reads_through_lets(atomic: &Atomic) -> bool {
    let buffers = collect_store_names(&atomic.body);
    let mut finder = HiddenLoadFinder {
        lets: Scope::new(),
        buffers: &buffers,
        inside_store: false,
        found: false,
    };
    finder.include_stmt(&atomic.body);
    finder.found
}

#[derive(Default)]
struct RemoveUnnecessaryMutexUse {
    elided: FxHashSet<Name>,
}

impl IrMutator for RemoveUnnecessaryMutexUse {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        let Some(atomic) = stmt.as_atomic().filter(|atomic| atomic.needs_mutex()) else {
            return mutate_stmt_children(self, stmt);
        };
        if reads_through_lets(atomic) {
            tracing::debug!(
                producer = %atomic.producer_name,
                mutex = %atomic.mutex_name,
                "mutex retained: store reads its buffer through a let binding"
            );
            return mutate_stmt_children(self, stmt);
        }
        tracing::debug!(
            producer = %atomic.producer_name,
            mutex = %atomic.mutex_name,
            "mutex elided"
        );
        self.elided.insert(atomic.mutex_name.clone());
        let body = self.mutate_stmt(&atomic.body);
        Stmt::atomic(Atomic {
            mutex_name: Name::empty(),
            mutex_indices: Vec::new(),
            body,
            ..atomic.clone()
        })
    }
}

fn remove_unnecessary_mutex_use(stmt: &Stmt) -> (Stmt, FxHashSet<Name>) {
    let mut pass = RemoveUnnecessaryMutexUse::default();
    let stmt = pass.mutate_stmt(stmt);
    (stmt, pass.elided)
}

// ── Stage 2: synthesis ──────────────────────────────────────────────

/// Atomic regions of one producer.
struct ProducerAtomics<'a> {
    producer: &'a Name,
    atomics: Vec<Atomic>,
    visited: VisitedNodes,
}

impl IrVisitor for ProducerAtomics<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Some(atomic) = stmt.as_atomic() {
            if atomic.producer_name == *self.producer {
                self.atomics.push(atomic.clone());
            }
        }
        walk_stmt(self, stmt);
    }

    fn include_expr(&mut self, _expr: &Expr) {}

    fn include_stmt(&mut self, stmt: &Stmt) {
        if self.visited.first_visit_stmt(stmt) {
            self.visit_stmt(stmt);
        }
    }
}

/// Synchronization metadata shared by the locked regions of a producer.
struct LockDomain {
    mutex: Name,
    tuple_size: usize,
    dimensions: usize,
}

/// Lock domain of `producer`, or `None` if none of its regions lock.
fn lock_domain(producer: &Name, body: &Stmt) -> Result<Option<LockDomain>, IrError> {
    let mut collector = ProducerAtomics {
        producer,
        atomics: Vec::new(),
        visited: VisitedNodes::default(),
    };
    collector.include_stmt(body);
    let atomics = collector.atomics;

    let Some(first) = atomics.first() else {
        return Ok(None);
    };
    let inconsistent = |field, first: String, second: String| IrError::InconsistentAtomic {
        producer: producer.clone(),
        field,
        first,
        second,
    };
    for other in atomics.iter().skip(1) {
        if other.tuple_size != first.tuple_size {
            return Err(inconsistent(
                "tuple_size",
                first.tuple_size.to_string(),
                other.tuple_size.to_string(),
            ));
        }
        if other.dimensions != first.dimensions {
            return Err(inconsistent(
                "dimensions",
                first.dimensions.to_string(),
                other.dimensions.to_string(),
            ));
        }
    }

    // Elision is decided per region; only the locked ones must agree.
    let mut locked = atomics.iter().filter(|atomic| atomic.needs_mutex());
    let Some(mutex) = locked.next().map(|atomic| atomic.mutex_name.clone()) else {
        return Ok(None);
    };
    if let Some(other) = locked.find(|atomic| atomic.mutex_name != mutex) {
        return Err(inconsistent(
            "mutex_name",
            mutex.to_string(),
            other.mutex_name.to_string(),
        ));
    }
    Ok(Some(LockDomain {
        mutex,
        tuple_size: first.tuple_size,
        dimensions: first.dimensions,
    }))
}

/// Buffer that carries the producer's shape metadata.
fn shape_buffer(producer: &Name, tuple_size: usize) -> Name {
    if tuple_size > 1 {
        producer.child(0)
    } else {
        producer.clone()
    }
}

/// `<buffer>.<field>.<dim>` as an `int32` variable.
fn buffer_field(buffer: &Name, field: &str, dim: usize) -> Expr {
    Expr::var(Type::int(32), buffer.child(format!("{field}.{dim}")))
}

/// Stack allocation of `domain.mutex` around `body`, sized to the element
/// count of `buffer`, with the buffer's min and stride mirrored into the
/// mutex namespace.
fn mutex_allocation(domain: &LockDomain, buffer: &Name, body: Stmt) -> Stmt {
    let mutex = &domain.mutex;
    let mut body = body;
    for dim in (0..domain.dimensions).rev() {
        body = Stmt::let_stmt(
            mutex.child(format!("stride.{dim}")),
            buffer_field(buffer, "stride", dim),
            body,
        );
        body = Stmt::let_stmt(
            mutex.child(format!("min.{dim}")),
            buffer_field(buffer, "min", dim),
            body,
        );
    }
    let count = (0..domain.dimensions)
        .map(|dim| buffer_field(buffer, "extent", dim))
        .reduce(Expr::mul)
        .unwrap_or_else(|| Expr::from(1));
    Stmt::allocate(Allocate {
        name: mutex.clone(),
        ty: MUTEX_ARRAY,
        memory_type: MemoryType::Stack,
        extents: Vec::new(),
        condition: op::const_true(1),
        body,
        new_expr: Some(Expr::call(
            MUTEX_ARRAY,
            MUTEX_ARRAY_CREATE,
            [count],
            CallType::Extern,
        )),
        free_function: Some(Name::new(MUTEX_ARRAY_DESTROY)),
    })
}

fn mutex_call(function: &str, mutex: &Name, index: Expr) -> Stmt {
    let array = Expr::var(MUTEX_ARRAY, mutex.clone());
    Stmt::evaluate(Expr::call(
        Type::int(32),
        function,
        [array, index],
        CallType::Extern,
    ))
}

#[derive(Default)]
struct SynthesizeMutexes {
    allocated: Vec<Name>,
    /// Mutex arrays whose allocation encloses the current node.
    enclosing: Vec<Name>,
    error: Option<IrError>,
}

impl SynthesizeMutexes {
    fn producer(&mut self, stmt: &Stmt, name: &Name, body: &Stmt) -> Stmt {
        let domain = match lock_domain(name, body) {
            Ok(Some(domain)) if !self.allocated.contains(&domain.mutex) => domain,
            Ok(_) => return mutate_stmt_children(self, stmt),
            Err(err) => {
                self.error = Some(err);
                return stmt.clone();
            }
        };
        let buffer = shape_buffer(name, domain.tuple_size);
        tracing::debug!(
            producer = %name,
            mutex = %domain.mutex,
            buffer = %buffer,
            dimensions = domain.dimensions,
            "mutex array allocated"
        );

        self.allocated.push(domain.mutex.clone());
        self.enclosing.push(domain.mutex.clone());
        let body = self.mutate_stmt(body);
        self.enclosing.pop();
        Stmt::producer(name.clone(), mutex_allocation(&domain, &buffer, body))
    }

    fn locked_atomic(&mut self, stmt: &Stmt, atomic: &Atomic) -> Stmt {
        let mutex = &atomic.mutex_name;
        if !self.enclosing.contains(mutex) {
            self.error = Some(IrError::UnallocatedMutex {
                producer: atomic.producer_name.clone(),
                mutex: mutex.clone(),
            });
            return stmt.clone();
        }
        let index = match atomic.mutex_indices.as_slice() {
            [index] => index.clone(),
            _ => Expr::from(0),
        };
        tracing::debug!(
            producer = %atomic.producer_name,
            mutex = %mutex,
            index = %index,
            "atomic region locked"
        );
        let body = self.mutate_stmt(&atomic.body);
        let locked = Stmt::block(
            mutex_call(MUTEX_ARRAY_LOCK, mutex, index.clone()),
            Stmt::block(body, mutex_call(MUTEX_ARRAY_UNLOCK, mutex, index)),
        );
        Stmt::atomic(Atomic {
            body: locked,
            ..atomic.clone()
        })
    }
}

impl IrMutator for SynthesizeMutexes {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        if self.error.is_some() {
            return stmt.clone();
        }
        match stmt.kind() {
            StmtKind::ProducerConsumer {
                name,
                is_producer: true,
                body,
            } => self.producer(stmt, name, body),
            StmtKind::Atomic(atomic) if atomic.needs_mutex() => self.locked_atomic(stmt, atomic),
            _ => mutate_stmt_children(self, stmt),
        }
    }
}

fn synthesize_mutexes(stmt: &Stmt) -> Result<(Stmt, Vec<Name>), IrError> {
    let mut pass = SynthesizeMutexes::default();
    let stmt = pass.mutate_stmt(stmt);
    match pass.error {
        Some(err) => Err(err),
        None => Ok((stmt, pass.allocated)),
    }
}

#[cfg(test)]
mod tests;
