//! Peeled epilogue.
//!
//! When the kernel exits, iteration `T - 1 - k` still has stages
//! `max_stage - k + 1..=max_stage` to run. Part `i` (for `i` in
//! `1..=max_stage`) clones every op of stage `i` or later, reading version
//! `max_stage - stage + i` of its operands.

use tracing::trace;

use swp_ir::{Rewriter, ValueId};

use crate::error::PipelineError;
use crate::options::PipelinerPart;
use crate::pipeline::{clone_and_remap, LoopPipeliner};

impl LoopPipeliner<'_> {
    /// Emit the epilogue at the insertion point. `returned` holds the
    /// kernel's results for the original iter args; entries whose final
    /// value is produced in the epilogue are overwritten.
    pub(crate) fn emit_epilogue(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        mut returned: Vec<ValueId>,
    ) -> Result<Vec<ValueId>, PipelineError> {
        let max_stage = self.info.max_stage;
        let last_iteration = self.info.trip_count - 1;
        for i in 0..max_stage {
            let iv = self.info.iv_at(last_iteration - i64::from(i))?;
            let iv = rewriter.constant(iv);
            self.versions.set(self.info.iv, max_stage - i, iv);
        }

        for i in 1..=max_stage {
            for pos in 0..self.info.op_order.len() {
                let op = self.info.op_order[pos];
                let stage = self.stage_of(op);
                if stage < i {
                    continue;
                }
                let version = max_stage - stage + i;
                let versions = &self.versions;
                let new_op = clone_and_remap(rewriter, op, |value| versions.remap(value, version))?;
                self.annotate(rewriter.func_mut(), new_op, PipelinerPart::Epilogue, i - 1);

                let results = rewriter.func().results(op).to_vec();
                for (index, result) in results.into_iter().enumerate() {
                    let cloned = rewriter.func().result(new_op, index);
                    self.versions.set(result, version, cloned);
                    for (carried, &yielded) in self.info.yielded.iter().enumerate() {
                        if yielded != result {
                            continue;
                        }
                        // Past the last slot means no later iteration reads it:
                        // this is the loop's final value.
                        if version + 1 > max_stage {
                            returned[carried] = cloned;
                        } else {
                            self.versions
                                .set(self.info.iter_args[carried], version + 1, cloned);
                        }
                    }
                }
            }
            trace!(part = i, "epilogue part emitted");
        }
        Ok(returned)
    }
}
