//! Strand lowering passes
//!
//! Passes here take the working `Stmt` tree of one pipeline and return a
//! rewritten tree, or an [`IrError`](strand_ir::IrError) that stops
//! compilation of that pipeline.
//!
//! - [`add_atomic_mutex`]: decide which atomic reduction updates still need a
//!   lock, then allocate mutex arrays and bracket the remaining updates with
//!   lock/unlock calls
//!
//! Every pass takes a [`LowerContext`], which owns the options and the
//! associative-operator table cache.

mod context;
pub mod mutex;

pub use context::{LowerContext, LowerOptions};
pub use mutex::{add_atomic_mutex, MutexSynthesis};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=strand_lower=debug`
/// or `RUST_LOG=strand_reduce=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
