//! Whole-function driver.

use tracing::debug;

use swp_ir::{Function, OpId, OpKind, Rewriter};

use crate::error::{NotApplicable, PipelineError};
use crate::options::PipeliningOptions;
use crate::pipeline::{pipeline_for_loop, PipelinedLoop};

/// What [`pipeline_loops`] did to each loop of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub pipelined: Vec<PipelinedLoop>,
    /// Loops left untouched, with the reason.
    pub skipped: Vec<(OpId, NotApplicable)>,
}

/// Pipeline every counted loop of `func`, innermost first.
///
/// Loops that do not qualify are skipped and reported. Any other error
/// aborts the run with the function partially rewritten. Loops created by
/// the transform itself (kernels and their clones) are not revisited.
#[tracing::instrument(level = "debug", skip_all, fields(ops = func.num_ops()))]
pub fn pipeline_loops(func: &mut Function, options: &PipeliningOptions) -> Result<PipelineSummary, PipelineError> {
    let loops: Vec<OpId> = func
        .all_ops()
        .into_iter()
        .filter(|&op| func.kind(op) == OpKind::For)
        .collect();

    let mut summary = PipelineSummary::default();
    let mut rewriter = Rewriter::new(func);
    // Pre-order lists a loop before the loops nested in it.
    for for_op in loops.into_iter().rev() {
        if rewriter.func().is_erased(for_op) {
            continue;
        }
        match pipeline_for_loop(&mut rewriter, for_op, options) {
            Ok(pipelined) => summary.pipelined.push(pipelined),
            Err(PipelineError::NotApplicable(reason)) => {
                debug!(%for_op, %reason, "loop skipped");
                summary.skipped.push((for_op, reason));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}
