//! Kernel construction.
//!
//! The kernel loop runs the steady state: in kernel iteration `j` the ops
//! of stage `s` work on original iteration `j + max_stage - s`. Values
//! crossing stages travel in extra carried arguments, one per stage of
//! distance, appended after the original iter args.
//!
//! In predicated mode the kernel keeps the original trip count and every
//! stage below `max_stage` is guarded by `iv < ub - (max_stage - s) * step`.

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use swp_ir::{CloneMap, CmpPred, OpId, OperandRef, Rewriter, ValueId};

use crate::error::PipelineError;
use crate::liverange::CrossStageValues;
use crate::options::PipelinerPart;
use crate::pipeline::LoopPipeliner;

/// Kernel argument index holding a cross-stage value at a given age.
///
/// Age `a` is the value produced `a` iterations before the reader's.
#[derive(Clone, Debug, Default)]
pub(crate) struct LoopArgMap {
    args: FxHashMap<(ValueId, u32), usize>,
}

impl LoopArgMap {
    fn insert(&mut self, value: ValueId, age: u32, arg: usize) {
        self.args.insert((value, age), arg);
    }

    pub(crate) fn get(&self, value: ValueId, age: u32) -> Option<usize> {
        self.args.get(&(value, age)).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.args.len()
    }
}

impl LoopPipeliner<'_> {
    /// Create the kernel loop with its initial carried values, taken from
    /// the prologue's versions. The body is left empty.
    pub(crate) fn create_kernel_loop(
        &self,
        rewriter: &mut Rewriter<'_>,
        cross_stage: &CrossStageValues,
    ) -> Result<(OpId, LoopArgMap), PipelineError> {
        let max_stage = self.info.max_stage;
        let mut inits = Vec::with_capacity(self.info.iter_args.len() + cross_stage.len());
        for (&arg, &yield_stage) in self.info.iter_args.iter().zip(&self.info.yield_stages) {
            inits.push(self.versions.get(arg, max_stage - yield_stage)?);
        }

        let mut loop_args = LoopArgMap::default();
        for (value, range) in cross_stage.iter() {
            let span = range.span();
            for offset in 0..span {
                let version = max_stage - range.last_use_stage + offset;
                inits.push(self.versions.get(value, version)?);
                loop_args.insert(value, span - offset, inits.len() - 1);
            }
        }

        // Peeling runs the last `max_stage` iterations in the epilogue.
        let ub = if self.options.peel_epilogue() {
            rewriter.constant(self.info.ub_before(max_stage)?)
        } else {
            self.info.ub_value
        };
        let kernel = rewriter.create_for(self.info.lb_value, ub, self.info.step_value, &inits);
        let body = rewriter.func().for_body(kernel);
        if let Some(term) = rewriter.func().terminator(body) {
            rewriter.erase_op(term);
        }
        Ok((kernel, loop_args))
    }

    /// Fill the kernel body: clone the ops in schedule order, rewire reads
    /// of older iterations to carried arguments, guard stages in predicated
    /// mode, then yield the next carried values.
    pub(crate) fn create_kernel(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        kernel: OpId,
        cross_stage: &CrossStageValues,
        loop_args: &LoopArgMap,
    ) -> Result<(), PipelineError> {
        self.versions.clear();
        let max_stage = self.info.max_stage;
        let body = rewriter.func().for_body(kernel);
        let new_iv = rewriter.func().for_induction_var(kernel);
        let new_args = rewriter.func().for_iter_args(kernel).to_vec();
        rewriter.set_insertion_point_to_start(body);

        let mut mapping = CloneMap::new();
        mapping.map_value(self.info.iv, new_iv);
        for (&old, &new) in self.info.iter_args.iter().zip(&new_args) {
            mapping.map_value(old, new);
        }

        let mut predicates: SmallVec<[Option<ValueId>; 4]> = smallvec![None; max_stage as usize + 1];
        if !self.options.peel_epilogue() {
            for stage in 0..max_stage {
                let bound = rewriter.constant(self.info.ub_before(max_stage - stage)?);
                predicates[stage as usize] = Some(rewriter.cmp(CmpPred::Slt, new_iv, bound));
            }
        }

        for pos in 0..self.info.op_order.len() {
            let op = self.info.op_order[pos];
            let use_stage = self.stage_of(op);
            let mut new_op = rewriter.clone_op_with(op, &mut mapping);
            let slots: Vec<OperandRef> = {
                let func = rewriter.func();
                func.walk(op)
                    .into_iter()
                    .flat_map(|nested| {
                        (0..func.operands(nested).len()).map(move |index| OperandRef { op: nested, index })
                    })
                    .collect()
            };

            for OperandRef { op: owner, index } in slots {
                let Some(new_owner) = mapping.lookup_op(owner) else {
                    continue;
                };
                let source = rewriter.func().operand(owner, index);
                let rewired = if source == self.info.iv {
                    // The iv is implicit; offset it by the stages still ahead.
                    let offset = self.info.stage_offset(max_stage - use_stage)?;
                    rewriter.set_insertion_point(new_op);
                    let offset = rewriter.constant(offset);
                    let iv = rewriter.add(new_iv, offset);
                    rewriter.set_insertion_point_after(new_op);
                    Some(iv)
                } else {
                    self.rewire_operand(rewriter, &mapping, loop_args, &new_args, source, use_stage)?
                };
                if let Some(value) = rewired {
                    rewriter.func_mut().set_operand(new_owner, index, value);
                }
            }

            if let Some(predicate) = predicates[use_stage as usize] {
                let Some(predicate_fn) = self.options.predicate_fn() else {
                    return Err(PipelineError::PredicateRejected { op: new_op });
                };
                new_op = predicate_fn(rewriter, new_op, predicate)?;
                let originals = rewriter.func().results(op).to_vec();
                let guarded = rewriter.func().results(new_op).to_vec();
                for (old, new) in originals.into_iter().zip(guarded) {
                    mapping.map_value(old, new);
                }
            }
            rewriter.set_insertion_point_after(new_op);
            self.annotate(rewriter.func_mut(), new_op, PipelinerPart::Kernel, 0);
        }

        rewriter.set_insertion_point_to_end(body);
        let yielded = self.kernel_yield(rewriter, kernel, &mapping, &predicates, &new_args, cross_stage)?;
        rewriter.yield_op(&yielded);
        trace!(for_op = %self.info.for_op, %kernel, yielded = yielded.len(), "kernel body emitted");
        Ok(())
    }

    /// New source for an operand of a kernel clone read at `use_stage`,
    /// or `None` when the clone mapping already got it right.
    fn rewire_operand(
        &self,
        rewriter: &Rewriter<'_>,
        mapping: &CloneMap,
        loop_args: &LoopArgMap,
        new_args: &[ValueId],
        source: ValueId,
        use_stage: u32,
    ) -> Result<Option<ValueId>, PipelineError> {
        let func = rewriter.func();
        let mut producer_value = source;
        if let Some((block, arg)) = func.block_arg_owner(source) {
            if block == self.info.body {
                let yielded = self.info.yielded[arg - 1];
                let Some(dep_stage) = func.defining_op(yielded).and_then(|dep| self.info.stage(dep)) else {
                    return Ok(None);
                };
                if dep_stage == use_stage {
                    return Ok(None);
                }
                // Produced one stage later in the previous iteration: that
                // is the clone already emitted in this kernel iteration.
                if dep_stage == use_stage + 1 {
                    return Ok(Some(mapping.lookup_value_or_default(yielded)));
                }
                producer_value = yielded;
            }
        }
        let Some(def_stage) = func
            .defining_op(producer_value)
            .and_then(|def| self.info.stage(def))
        else {
            return Ok(None);
        };
        if def_stage == use_stage {
            return Ok(None);
        }
        let age = use_stage - def_stage;
        let arg = loop_args
            .get(source, age)
            .ok_or(PipelineError::MissingLoopArg { value: source, age })?;
        Ok(Some(new_args[arg]))
    }

    /// Operands of the kernel's yield, recording which kernel result holds
    /// each version for the epilogue.
    fn kernel_yield(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        kernel: OpId,
        mapping: &CloneMap,
        predicates: &[Option<ValueId>],
        new_args: &[ValueId],
        cross_stage: &CrossStageValues,
    ) -> Result<Vec<ValueId>, PipelineError> {
        let max_stage = self.info.max_stage;
        let mut yielded = Vec::with_capacity(new_args.len());

        for (index, &value) in self.info.yielded.iter().enumerate() {
            let mut source = mapping.lookup_value_or_default(value);
            // A guarded stage must not clobber a result read after the loop.
            let yield_stage = self.info.yield_stages[index];
            if !self.options.peel_epilogue()
                && yield_stage < max_stage
                && rewriter.func().has_uses(self.info.results[index])
            {
                if let Some(predicate) = predicates[yield_stage as usize] {
                    source = rewriter.select(predicate, source, new_args[index]);
                }
            }
            yielded.push(source);
        }

        for (value, range) in cross_stage.iter() {
            let mut version = max_stage - range.last_use_stage + 1;
            for _ in 1..range.span() {
                let result = rewriter.func().result(kernel, yielded.len());
                self.versions.set(value, version, result);
                version += 1;
                // Shift older versions one argument down.
                yielded.push(new_args[yielded.len() + 1]);
            }
            let result = rewriter.func().result(kernel, yielded.len());
            self.versions.set(value, version, result);
            yielded.push(mapping.lookup_value_or_default(value));
        }

        for (index, &yield_stage) in self.info.yield_stages.iter().enumerate() {
            if yield_stage > 0 {
                let result = rewriter.func().result(kernel, index);
                self.versions
                    .set(self.info.iter_args[index], max_stage - yield_stage + 1, result);
            }
        }
        Ok(yielded)
    }
}
