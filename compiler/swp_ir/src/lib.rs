//! Region-based IR for loop transformations.
//!
//! This crate provides the graph and builder collaborators the pipelining
//! transform in `swp_pipeline` operates on:
//!
//! - **IR graph** ([`Function`], [`OpId`], [`ValueId`], [`BlockId`]): arena
//!   storage for ops, values and single-block regions, with the queries a
//!   rewrite needs (defining op, owning block, ancestry, nested uses).
//!
//! - **Rewriter** ([`Rewriter`], [`CloneMap`]): insertion-point-driven op
//!   creation, deep cloning with operand remapping, erasure and replacement.
//!
//! - **Reference interpreter** ([`interp::run`]): executes a function over a
//!   flat memory and records its store trace, so a rewrite can be checked for
//!   semantic equivalence.
//!
//! - **Verifier** ([`verify::verify`]): dominance and terminator checks.
//!
//! # Crate Dependencies
//!
//! No dependency on the pipelining crate. The optional `serde` feature
//! derives serialization for the IR arenas.

pub mod interp;
pub mod ir;
mod print;
pub mod rewriter;
pub mod verify;

pub use interp::{EvalError, Execution, StoreEvent};
pub use ir::{BinOp, BlockId, CmpPred, Function, OpId, OpKind, OperandRef, Ty, ValueDef, ValueId};
pub use print::FunctionDisplay;
pub use rewriter::{CloneMap, InsertPoint, Rewriter};
pub use verify::VerifyError;
