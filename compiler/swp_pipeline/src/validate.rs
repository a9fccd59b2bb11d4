//! Precondition checks and loop facts.
//!
//! [`analyze_loop`] either returns a [`LoopInfo`] snapshot of everything the
//! emission phases need, or a [`NotApplicable`] reason. It never mutates the
//! function, so a rejected loop is left exactly as it was.

use rustc_hash::FxHashMap;
use tracing::debug;

use swp_ir::{BlockId, Function, OpId, OpKind, ValueId};

use crate::error::{NotApplicable, PipelineError};
use crate::options::PipeliningOptions;

/// Where a body operand comes from, looking through one loop-carried hop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Producer {
    /// Defined by `op` in the current iteration.
    Direct(OpId),
    /// An iter arg, yielded by `op` in the previous iteration.
    Carried(OpId),
}

impl Producer {
    pub(crate) fn op(self) -> OpId {
        match self {
            Producer::Direct(op) | Producer::Carried(op) => op,
        }
    }

    pub(crate) fn distance(self) -> u32 {
        match self {
            Producer::Direct(_) => 0,
            Producer::Carried(_) => 1,
        }
    }
}

/// Snapshot of a pipelinable loop.
///
/// Values and ops refer to the original loop, which stays in place until
/// the very end of the transform.
#[derive(Clone, Debug)]
pub(crate) struct LoopInfo {
    pub(crate) for_op: OpId,
    pub(crate) body: BlockId,
    pub(crate) iv: ValueId,
    pub(crate) iter_args: Vec<ValueId>,
    pub(crate) inits: Vec<ValueId>,
    pub(crate) yielded: Vec<ValueId>,
    pub(crate) results: Vec<ValueId>,
    pub(crate) lb_value: ValueId,
    pub(crate) ub_value: ValueId,
    pub(crate) step_value: ValueId,
    pub(crate) lb: i64,
    pub(crate) ub: i64,
    pub(crate) step: i64,
    pub(crate) trip_count: i64,
    pub(crate) max_stage: u32,
    pub(crate) stages: FxHashMap<OpId, u32>,
    pub(crate) op_order: Vec<OpId>,
    /// Stage of the op producing each yielded value.
    pub(crate) yield_stages: Vec<u32>,
}

impl LoopInfo {
    pub(crate) fn stage(&self, op: OpId) -> Option<u32> {
        self.stages.get(&op).copied()
    }

    /// Induction value of the original loop's `iteration`-th iteration.
    pub(crate) fn iv_at(&self, iteration: i64) -> Result<i64, PipelineError> {
        narrow(i128::from(self.lb) + i128::from(iteration) * i128::from(self.step))
    }

    /// `ub - stages * step`: the bound below which an iteration still has
    /// `stages` more iterations after it inside the loop.
    pub(crate) fn ub_before(&self, stages: u32) -> Result<i64, PipelineError> {
        narrow(i128::from(self.ub) - i128::from(stages) * i128::from(self.step))
    }

    /// Induction distance covered by `stages` iterations.
    pub(crate) fn stage_offset(&self, stages: u32) -> Result<i64, PipelineError> {
        narrow(i128::from(stages) * i128::from(self.step))
    }

    /// Resolve `value` to the body op producing it.
    ///
    /// `None` for the induction variable and for block arguments of other
    /// blocks. Values defined outside the loop resolve to ops without a
    /// stage.
    pub(crate) fn producer(&self, func: &Function, value: ValueId) -> Option<Producer> {
        if let Some((block, index)) = func.block_arg_owner(value) {
            if block != self.body || index == 0 {
                return None;
            }
            let yielded = *self.yielded.get(index - 1)?;
            return func.defining_op(yielded).map(Producer::Carried);
        }
        func.defining_op(value).map(Producer::Direct)
    }
}

/// Check every precondition for pipelining `for_op` with `options`.
pub(crate) fn analyze_loop(
    func: &Function,
    for_op: OpId,
    options: &PipeliningOptions,
) -> Result<LoopInfo, NotApplicable> {
    if func.is_erased(for_op) || func.kind(for_op) != OpKind::For {
        debug!(%for_op, "not a counted loop -> bail");
        return Err(NotApplicable::NotAForLoop { op: for_op });
    }
    let lb_value = func.for_lower_bound(for_op);
    let ub_value = func.for_upper_bound(for_op);
    let step_value = func.for_step(for_op);
    let (Some(lb), Some(ub), Some(step)) = (
        func.const_value(lb_value),
        func.const_value(ub_value),
        func.const_value(step_value),
    ) else {
        debug!(%for_op, "no constant bounds or step -> bail");
        return Err(NotApplicable::NonConstantBounds);
    };
    if step <= 0 {
        debug!(%for_op, step, "non-positive step -> bail");
        return Err(NotApplicable::NonPositiveStep { step });
    }
    if !options.peel_epilogue() && !options.has_predicate_fn() {
        debug!(%for_op, "no epilogue or predicate set -> bail");
        return Err(NotApplicable::NoDrainStrategy);
    }
    let trip_count = trip_count(lb, ub, step);

    let schedule = options.schedule(func, for_op);
    if schedule.is_empty() {
        debug!(%for_op, "empty schedule -> bail");
        return Err(NotApplicable::EmptySchedule);
    }
    let mut stages = FxHashMap::default();
    let mut op_order = Vec::with_capacity(schedule.len());
    let mut max_stage = 0;
    for (op, stage) in schedule {
        if stages.insert(op, stage).is_some() {
            debug!(%op, "op scheduled twice -> bail");
            return Err(NotApplicable::DuplicateStage { op });
        }
        max_stage = max_stage.max(stage);
        op_order.push(op);
    }
    if trip_count <= i64::from(max_stage) {
        debug!(%for_op, trip_count, max_stage, "fewer loop iterations than pipeline stages -> bail");
        return Err(NotApplicable::TooFewIterations {
            trip_count,
            max_stage,
        });
    }
    // Every constant the kernel derives lies between these two.
    let drain = i128::from(max_stage) * i128::from(step);
    if i64::try_from(drain).is_err() || i64::try_from(i128::from(ub) - drain).is_err() {
        debug!(%for_op, ub, step, max_stage, "drained bounds overflow -> bail");
        return Err(NotApplicable::BoundsOverflow { ub, step, max_stage });
    }

    let body = func.for_body(for_op);
    if let Some(&op) = func
        .ops_without_terminator(body)
        .iter()
        .find(|op| !stages.contains_key(op))
    {
        debug!(%op, "op not assigned a pipeline stage -> bail");
        return Err(NotApplicable::UnstagedOp { op });
    }
    for &op in &op_order {
        if func.kind(op).is_terminator() && func.parent_block(op) == Some(body) {
            debug!(%op, "terminator should not be assigned a stage -> bail");
            return Err(NotApplicable::StagedTerminator { op });
        }
        if func.is_erased(op) || func.parent_block(op) != Some(body) {
            debug!(%op, "staged op outside the loop body block -> bail");
            return Err(NotApplicable::StagedOutsideBody { op });
        }
    }

    let yielded = func.for_yielded(for_op).to_vec();
    let mut yield_stages = Vec::with_capacity(yielded.len());
    for &value in &yielded {
        let Some(stage) = func
            .defining_op(value)
            .and_then(|def| stages.get(&def).copied())
        else {
            debug!(%value, "only loop-carried dependencies of distance 1 are supported -> bail");
            return Err(NotApplicable::UnsupportedCarriedDistance { value });
        };
        yield_stages.push(stage);
    }

    let info = LoopInfo {
        for_op,
        body,
        iv: func.for_induction_var(for_op),
        iter_args: func.for_iter_args(for_op).to_vec(),
        inits: func.for_inits(for_op).to_vec(),
        yielded,
        results: func.results(for_op).to_vec(),
        lb_value,
        ub_value,
        step_value,
        lb,
        ub,
        step,
        trip_count,
        max_stage,
        stages,
        op_order,
        yield_stages,
    };
    check_schedule_order(func, &info)?;
    Ok(info)
}

/// Number of iterations of `lb..ub` by a positive `step`; negative when
/// `ub < lb`. Saturates at the `i64` range.
pub(crate) fn trip_count(lb: i64, ub: i64, step: i64) -> i64 {
    let (span, step) = (i128::from(ub) - i128::from(lb), i128::from(step));
    let count = if span > 0 { (span + step - 1) / step } else { span / step };
    i64::try_from(count).unwrap_or(if count > 0 { i64::MAX } else { i64::MIN })
}

fn narrow(value: i128) -> Result<i64, PipelineError> {
    i64::try_from(value).map_err(|_| PipelineError::ConstantOverflow { value })
}

/// Every staged op must read values its schedule has already produced.
///
/// A direct operand needs an earlier stage, or the same stage and an
/// earlier position in the op order. A carried operand may come from at
/// most one stage later, and from the next stage only when its producer
/// is ordered first, since the kernel then reads the fresh clone.
fn check_schedule_order(func: &Function, info: &LoopInfo) -> Result<(), NotApplicable> {
    let position: FxHashMap<OpId, usize> = info
        .op_order
        .iter()
        .enumerate()
        .map(|(pos, &op)| (op, pos))
        .collect();
    for (pos, &op) in info.op_order.iter().enumerate() {
        let stage = info.stages[&op];
        let mut operands: Vec<ValueId> = func.operands(op).to_vec();
        operands.extend(
            func.used_values_defined_above(op)
                .into_iter()
                .map(|slot| func.operand(slot.op, slot.index)),
        );
        for value in operands {
            let Some(producer) = info.producer(func, value) else {
                continue;
            };
            let Some(def_stage) = info.stage(producer.op()) else {
                continue;
            };
            let ready_stage = stage + producer.distance();
            let ordered_first = position[&producer.op()] < pos;
            if def_stage > ready_stage || (def_stage == ready_stage && !ordered_first) {
                debug!(%op, %value, "operand not produced yet in schedule order -> bail");
                return Err(NotApplicable::UseBeforeDef { op });
            }
        }
    }
    Ok(())
}
