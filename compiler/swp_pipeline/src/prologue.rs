//! Prologue emission.
//!
//! Part `i` (for `i` in `0..max_stage`) clones every op whose stage is at
//! most `i`, so that by the time the kernel starts, iteration `k` has run
//! stages `0..=max_stage - 1 - k`. Each clone reads the version of its
//! operands that belongs to its own iteration, `i - stage`.

use tracing::trace;

use swp_ir::Rewriter;

use crate::error::PipelineError;
use crate::options::PipelinerPart;
use crate::pipeline::{clone_and_remap, LoopPipeliner};

impl LoopPipeliner<'_> {
    pub(crate) fn emit_prologue(&mut self, rewriter: &mut Rewriter<'_>) -> Result<(), PipelineError> {
        for (&arg, &init) in self.info.iter_args.iter().zip(&self.info.inits) {
            self.versions.set(arg, 0, init);
        }
        for i in 0..self.info.max_stage {
            // The iv has no defining op to clone; materialize it.
            let iv = self.info.iv_at(i64::from(i))?;
            let iv = rewriter.constant(iv);
            self.versions.set(self.info.iv, i, iv);

            for pos in 0..self.info.op_order.len() {
                let op = self.info.op_order[pos];
                let stage = self.stage_of(op);
                if stage > i {
                    continue;
                }
                let version = i - stage;
                let versions = &self.versions;
                let new_op = clone_and_remap(rewriter, op, |value| versions.remap(value, version))?;
                self.annotate(rewriter.func_mut(), new_op, PipelinerPart::Prologue, i);

                let results = rewriter.func().results(op).to_vec();
                for (index, result) in results.into_iter().enumerate() {
                    let cloned = rewriter.func().result(new_op, index);
                    self.versions.set(result, version, cloned);
                    for (carried, &yielded) in self.info.yielded.iter().enumerate() {
                        if yielded == result {
                            self.versions
                                .set(self.info.iter_args[carried], version + 1, cloned);
                        }
                    }
                }
            }
            trace!(part = i, "prologue part emitted");
        }
        Ok(())
    }
}
