//! Orchestration of one loop's transform.
//!
//! Phases run in a fixed order, each as an `impl LoopPipeliner` block in
//! its own module:
//!
//! 1. `validate`: preconditions, no mutation
//! 2. `prologue`: stages `0..=i` of the first `max_stage` iterations
//! 3. `liverange`: cross-stage values
//! 4. `kernel`: the new loop and its rewired body
//! 5. `epilogue`: peeled tail, when peeling
//!
//! The original loop is replaced only after every phase succeeded. A
//! failure past step 1 leaves the partially rewritten IR in place.

use tracing::{debug, trace};

use swp_ir::{Function, OpId, OperandRef, Rewriter, ValueId};

use crate::error::PipelineError;
use crate::options::{PipelinerPart, PipeliningOptions};
use crate::validate::{analyze_loop, LoopInfo};
use crate::versions::ValueVersions;

/// Outcome of pipelining one loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelinedLoop {
    /// The kernel loop that replaced the original.
    pub kernel: OpId,
    /// Values that replaced the original loop's results.
    pub results: Vec<ValueId>,
}

/// State shared by the emission phases.
pub(crate) struct LoopPipeliner<'o> {
    pub(crate) info: LoopInfo,
    pub(crate) options: &'o PipeliningOptions,
    pub(crate) versions: ValueVersions,
}

impl<'o> LoopPipeliner<'o> {
    pub(crate) fn new(info: LoopInfo, options: &'o PipeliningOptions) -> Self {
        let versions = ValueVersions::new(info.max_stage);
        LoopPipeliner {
            info,
            options,
            versions,
        }
    }

    pub(crate) fn stage_of(&self, op: OpId) -> u32 {
        self.info.stages[&op]
    }

    pub(crate) fn annotate(&self, func: &mut Function, op: OpId, part: PipelinerPart, index: u32) {
        trace!(%op, part = part.as_str(), index, "clone emitted");
        self.options.annotate(func, op, part, index);
    }
}

/// Software-pipeline `for_op` according to `options`.
///
/// On success the original loop is gone: its results are replaced by the
/// kernel's (predicated) or the epilogue's (peeled). `NotApplicable`
/// errors leave the function untouched; any other error means the IR was
/// already modified (see [`PipelineError::modified_ir`]).
#[tracing::instrument(level = "debug", skip(rewriter, options))]
pub fn pipeline_for_loop(
    rewriter: &mut Rewriter<'_>,
    for_op: OpId,
    options: &PipeliningOptions,
) -> Result<PipelinedLoop, PipelineError> {
    let info = analyze_loop(rewriter.func(), for_op, options)?;
    let num_results = info.results.len();
    let mut pipeliner = LoopPipeliner::new(info, options);

    rewriter.set_insertion_point(for_op);
    pipeliner.emit_prologue(rewriter)?;

    let cross_stage = pipeliner.analyze_cross_stage_values(rewriter.func());
    let (kernel, loop_args) = pipeliner.create_kernel_loop(rewriter, &cross_stage)?;
    pipeliner.create_kernel(rewriter, kernel, &cross_stage, &loop_args)?;

    let mut results = rewriter.func().results(kernel)[..num_results].to_vec();
    if options.peel_epilogue() {
        rewriter.set_insertion_point_after(kernel);
        results = pipeliner.emit_epilogue(rewriter, results)?;
    }

    if num_results > 0 {
        rewriter.replace_op(for_op, &results);
    } else {
        rewriter.erase_op(for_op);
    }
    debug!(
        %kernel,
        max_stage = pipeliner.info.max_stage,
        cross_stage = cross_stage.len(),
        kernel_args = loop_args.len(),
        peeled = options.peel_epilogue(),
        "loop pipelined"
    );
    trace!(ir = %rewriter.func().display(), "after pipelining");
    Ok(PipelinedLoop { kernel, results })
}

/// Clone `op` at the insertion point and pass every operand slot that
/// reads from outside the clone to `remap`: the clone's own operands, and
/// nested operands that are block arguments or defined outside the clone.
/// `Ok(Some(v))` rewires the slot to `v`; `Ok(None)` leaves it.
pub(crate) fn clone_and_remap(
    rewriter: &mut Rewriter<'_>,
    op: OpId,
    mut remap: impl FnMut(ValueId) -> Result<Option<ValueId>, PipelineError>,
) -> Result<OpId, PipelineError> {
    let clone = rewriter.clone_op(op);
    let slots: Vec<OperandRef> = {
        let func = rewriter.func();
        let mut slots: Vec<OperandRef> = (0..func.operands(clone).len())
            .map(|index| OperandRef { op: clone, index })
            .collect();
        for nested in func.walk(clone).into_iter().skip(1) {
            for (index, &value) in func.operands(nested).iter().enumerate() {
                let outside = func
                    .defining_op(value)
                    .is_some_and(|def| !func.is_ancestor(clone, def));
                if outside || func.block_arg_owner(value).is_some() {
                    slots.push(OperandRef { op: nested, index });
                }
            }
        }
        slots
    };
    for OperandRef { op: owner, index } in slots {
        let current = rewriter.func().operand(owner, index);
        if let Some(replacement) = remap(current)? {
            rewriter.func_mut().set_operand(owner, index, replacement);
        }
    }
    Ok(clone)
}

#[cfg(test)]
mod tests;
