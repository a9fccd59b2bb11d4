//! Pipelining configuration and caller-supplied callbacks.

use std::fmt;

use swp_ir::{Function, OpId, Rewriter, ValueId};

use crate::error::PredicateRejected;

/// Which part of the pipelined loop an emitted clone belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelinerPart {
    Prologue,
    Kernel,
    Epilogue,
}

impl PipelinerPart {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelinerPart::Prologue => "prologue",
            PipelinerPart::Kernel => "kernel",
            PipelinerPart::Epilogue => "epilogue",
        }
    }
}

/// Assigns a stage to every op of a loop body, in evaluation order.
pub type ScheduleFn = Box<dyn Fn(&Function, OpId) -> Vec<(OpId, u32)>>;

/// Wraps a kernel op in a guard. Returns the replacement op, whose results
/// stand in for the original's.
pub type PredicateFn =
    Box<dyn Fn(&mut Rewriter<'_>, OpId, ValueId) -> Result<OpId, PredicateRejected>>;

/// Observes every emitted clone with its part and relative index.
pub type AnnotateFn = Box<dyn Fn(&mut Function, OpId, PipelinerPart, u32)>;

/// Options controlling [`pipeline_for_loop`](crate::pipeline_for_loop).
///
/// Peeling the epilogue is the default. Turning it off requires a
/// predicate function, which the kernel uses to disable out-of-range
/// stages instead.
pub struct PipeliningOptions {
    schedule_fn: ScheduleFn,
    peel_epilogue: bool,
    predicate_fn: Option<PredicateFn>,
    annotate_fn: Option<AnnotateFn>,
}

impl PipeliningOptions {
    pub fn new(schedule_fn: impl Fn(&Function, OpId) -> Vec<(OpId, u32)> + 'static) -> Self {
        PipeliningOptions {
            schedule_fn: Box::new(schedule_fn),
            peel_epilogue: true,
            predicate_fn: None,
            annotate_fn: None,
        }
    }

    #[must_use]
    pub fn with_peel_epilogue(mut self, peel: bool) -> Self {
        self.peel_epilogue = peel;
        self
    }

    #[must_use]
    pub fn with_predicate_fn(
        mut self,
        predicate_fn: impl Fn(&mut Rewriter<'_>, OpId, ValueId) -> Result<OpId, PredicateRejected>
            + 'static,
    ) -> Self {
        self.predicate_fn = Some(Box::new(predicate_fn));
        self
    }

    #[must_use]
    pub fn with_annotate_fn(
        mut self,
        annotate_fn: impl Fn(&mut Function, OpId, PipelinerPart, u32) + 'static,
    ) -> Self {
        self.annotate_fn = Some(Box::new(annotate_fn));
        self
    }

    pub fn peel_epilogue(&self) -> bool {
        self.peel_epilogue
    }

    pub fn has_predicate_fn(&self) -> bool {
        self.predicate_fn.is_some()
    }

    pub(crate) fn schedule(&self, func: &Function, for_op: OpId) -> Vec<(OpId, u32)> {
        (self.schedule_fn)(func, for_op)
    }

    pub(crate) fn predicate_fn(&self) -> Option<&PredicateFn> {
        self.predicate_fn.as_ref()
    }

    pub(crate) fn annotate(&self, func: &mut Function, op: OpId, part: PipelinerPart, index: u32) {
        if let Some(annotate_fn) = &self.annotate_fn {
            annotate_fn(func, op, part, index);
        }
    }
}

impl fmt::Debug for PipeliningOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeliningOptions")
            .field("peel_epilogue", &self.peel_epilogue)
            .field("predicate_fn", &self.predicate_fn.is_some())
            .field("annotate_fn", &self.annotate_fn.is_some())
            .finish_non_exhaustive()
    }
}
