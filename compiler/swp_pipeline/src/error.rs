//! Error types for loop pipelining.
//!
//! Two classes, kept apart so the commit point stays visible at every
//! call site:
//!
//! - [`NotApplicable`]: a precondition failed. Nothing was mutated and the
//!   caller may leave the loop as it is.
//! - Every other [`PipelineError`] variant: emission had already started.
//!   The IR is partially rewritten and is not rolled back; callers that
//!   need atomicity pipeline a copy of the function.

use swp_ir::{OpId, ValueId};

/// Why a loop cannot be pipelined. Raised before any mutation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NotApplicable {
    #[error("{op} is not a counted loop")]
    NotAForLoop { op: OpId },
    #[error("loop bounds and step are not compile-time constants")]
    NonConstantBounds,
    #[error("loop step must be positive, found {step}")]
    NonPositiveStep { step: i64 },
    #[error("neither epilogue peeling nor a predicate function is configured")]
    NoDrainStrategy,
    #[error("empty schedule")]
    EmptySchedule,
    #[error("loop runs {trip_count} iterations, not more than its {max_stage} pipeline stages")]
    TooFewIterations { trip_count: i64, max_stage: u32 },
    #[error("draining {max_stage} stages of step {step} from {ub} leaves the 64-bit index range")]
    BoundsOverflow { ub: i64, step: i64, max_stage: u32 },
    #[error("{op} is assigned a stage more than once")]
    DuplicateStage { op: OpId },
    #[error("{op} not assigned a pipeline stage")]
    UnstagedOp { op: OpId },
    #[error("terminator {op} should not be assigned a stage")]
    StagedTerminator { op: OpId },
    #[error("{op} is staged but not in the loop body block")]
    StagedOutsideBody { op: OpId },
    #[error("loop-carried value {value} is not produced by a staged op (only distance 1 is supported)")]
    UnsupportedCarriedDistance { value: ValueId },
    #[error("{op} reads a value the schedule has not produced yet")]
    UseBeforeDef { op: OpId },
}

impl NotApplicable {
    /// The op a diagnostic should be attached to, when there is one.
    pub fn op(&self) -> Option<OpId> {
        match self {
            NotApplicable::NotAForLoop { op }
            | NotApplicable::DuplicateStage { op }
            | NotApplicable::UnstagedOp { op }
            | NotApplicable::StagedTerminator { op }
            | NotApplicable::StagedOutsideBody { op }
            | NotApplicable::UseBeforeDef { op } => Some(*op),
            NotApplicable::NonConstantBounds
            | NotApplicable::NonPositiveStep { .. }
            | NotApplicable::NoDrainStrategy
            | NotApplicable::EmptySchedule
            | NotApplicable::TooFewIterations { .. }
            | NotApplicable::BoundsOverflow { .. }
            | NotApplicable::UnsupportedCarriedDistance { .. } => None,
        }
    }
}

/// Returned by a predicate function that cannot guard `op`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot predicate {op}")]
pub struct PredicateRejected {
    pub op: OpId,
}

/// Failure of [`pipeline_for_loop`](crate::pipeline_for_loop).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("loop not pipelined: {0}")]
    NotApplicable(#[from] NotApplicable),
    #[error("predicate function rejected kernel op {op}")]
    PredicateRejected { op: OpId },
    #[error("no version {version} recorded for {value}")]
    MissingVersion { value: ValueId, version: u32 },
    #[error("no kernel argument carries {value} at age {age}")]
    MissingLoopArg { value: ValueId, age: u32 },
    #[error("derived loop constant {value} does not fit in 64 bits")]
    ConstantOverflow { value: i128 },
}

impl PipelineError {
    /// Whether the IR was mutated before the failure.
    pub fn modified_ir(&self) -> bool {
        !matches!(self, PipelineError::NotApplicable(_))
    }
}

impl From<PredicateRejected> for PipelineError {
    fn from(rejected: PredicateRejected) -> Self {
        PipelineError::PredicateRejected { op: rejected.op }
    }
}
