//! Software pipelining for counted loops.
//!
//! Given a loop and a stage schedule for its body, the transform overlaps
//! successive iterations: a **prologue** starts the first `max_stage`
//! iterations, a **kernel** loop runs the steady state where every stage
//! is active, and the pipeline is drained either by a peeled **epilogue**
//! or by guarding stages inside the kernel (predicated mode).
//!
//! # Phases
//!
//! | Module | Role |
//! |--------|------|
//! | `validate` | Preconditions; nothing is mutated on failure |
//! | `prologue` | Clones stages `0..=i` for the first `max_stage` iterations |
//! | `liverange` | Values read in a later stage than they are produced in |
//! | `kernel` | New loop with extra carried arguments, rewired body, guards |
//! | `epilogue` | Peeled tail finishing the last in-flight iterations |
//! | `driver` | Applies the transform to every loop of a function |
//!
//! # Crate Dependencies
//!
//! Builds on `swp_ir` for the graph, the rewriter and the reference
//! interpreter the tests check equivalence with.

mod driver;
mod epilogue;
mod error;
mod kernel;
mod liverange;
mod options;
mod pipeline;
mod predicate;
mod prologue;
pub mod schedule;
mod validate;
mod versions;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use driver::{pipeline_loops, PipelineSummary};
pub use error::{NotApplicable, PipelineError, PredicateRejected};
pub use liverange::LiverangeInfo;
pub use options::{AnnotateFn, PipelinerPart, PipeliningOptions, PredicateFn, ScheduleFn};
pub use pipeline::{pipeline_for_loop, PipelinedLoop};
pub use predicate::predicate_op;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing output for the transform.
///
/// Does nothing unless `RUST_LOG` is set. With `SWP_LOG_TREE` also set,
/// spans render as an indented tree instead of flat lines. Safe to call
/// more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        if std::env::var("SWP_LOG_TREE").is_ok() {
            tracing_subscriber::registry()
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .with(filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
