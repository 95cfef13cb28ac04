//! Per-pipeline lowering context.

use std::sync::Arc;

use strand_ir::{Expr, IrError, Name};
use strand_reduce::{AssociativeOp, OpsTableCache};

/// Switches for the lowering passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LowerOptions {
    /// Clear the mutex of atomic updates that cannot race on a hidden read.
    pub elide_unneeded_mutexes: bool,
    /// Reject atomic updates whose store index reads the updated buffer.
    pub validate_atomic_indices: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            elide_unneeded_mutexes: true,
            validate_atomic_indices: true,
        }
    }
}

/// State threaded through the passes of one pipeline.
///
/// The ops-table cache is internally synchronized, so contexts of pipelines
/// compiled on different threads may share one through [`Self::with_ops_table`].
pub struct LowerContext {
    options: LowerOptions,
    ops_table: Arc<OpsTableCache>,
}

impl LowerContext {
    /// Context with its own, empty ops-table cache.
    pub fn new(options: LowerOptions) -> Self {
        Self::with_ops_table(options, Arc::new(OpsTableCache::new()))
    }

    pub fn with_ops_table(options: LowerOptions, ops_table: Arc<OpsTableCache>) -> Self {
        LowerContext { options, ops_table }
    }

    #[inline]
    pub fn options(&self) -> &LowerOptions {
        &self.options
    }

    #[inline]
    pub fn ops_table(&self) -> &Arc<OpsTableCache> {
        &self.ops_table
    }

    /// Recognize `exprs` as an associative update of the accumulators
    /// `x_names`, using this context's table cache.
    ///
    /// # Errors
    ///
    /// Propagates the lookup errors of [`strand_reduce::match_associative_op`].
    pub fn match_associative_op(
        &self,
        exprs: &[Expr],
        x_names: &[Name],
    ) -> Result<Option<AssociativeOp>, IrError> {
        strand_reduce::match_associative_op(&self.ops_table, exprs, x_names)
    }
}

impl Default for LowerContext {
    fn default() -> Self {
        Self::new(LowerOptions::default())
    }
}
