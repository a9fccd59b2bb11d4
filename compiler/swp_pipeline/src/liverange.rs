//! Cross-stage liverange analysis.
//!
//! A value read in a later stage than the one producing it must survive
//! across kernel iterations, one extra carried argument per stage of
//! distance. Reads through a loop-carried block argument already bridge
//! one iteration, so they only count when they reach further than that.

use rustc_hash::FxHashMap;

use swp_ir::{Function, ValueId};

use crate::pipeline::LoopPipeliner;

/// Stages between which a value must be kept alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiverangeInfo {
    pub def_stage: u32,
    pub last_use_stage: u32,
}

impl LiverangeInfo {
    /// Number of kernel arguments the value needs.
    pub fn span(self) -> u32 {
        self.last_use_stage - self.def_stage
    }
}

/// Cross-stage values in first-encounter order.
///
/// Iteration order decides the layout of the kernel's extra arguments and
/// results, so it has to be deterministic.
#[derive(Clone, Debug, Default)]
pub(crate) struct CrossStageValues {
    entries: Vec<(ValueId, LiverangeInfo)>,
    index: FxHashMap<ValueId, usize>,
}

impl CrossStageValues {
    fn entry(&mut self, value: ValueId) -> &mut LiverangeInfo {
        let pos = *self.index.entry(value).or_insert_with(|| {
            self.entries.push((value, LiverangeInfo::default()));
            self.entries.len() - 1
        });
        &mut self.entries[pos].1
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ValueId, LiverangeInfo)> + '_ {
        self.entries.iter().copied()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, value: ValueId) -> Option<LiverangeInfo> {
        self.index.get(&value).map(|&pos| self.entries[pos].1)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl LoopPipeliner<'_> {
    /// Collect every operand (nested reads from above included) whose
    /// producer sits in an earlier stage than its reader.
    pub(crate) fn analyze_cross_stage_values(&self, func: &Function) -> CrossStageValues {
        let mut cross_stage = CrossStageValues::default();
        for &op in &self.info.op_order {
            let stage = self.stage_of(op);
            let mut operands: Vec<ValueId> = func.operands(op).to_vec();
            operands.extend(
                func.used_values_defined_above(op)
                    .into_iter()
                    .map(|slot| func.operand(slot.op, slot.index)),
            );
            for value in operands {
                let Some(producer) = self.info.producer(func, value) else {
                    continue;
                };
                let Some(def_stage) = self.info.stage(producer.op()) else {
                    continue;
                };
                if def_stage == stage || def_stage == stage + producer.distance() {
                    continue;
                }
                debug_assert!(def_stage < stage, "schedule order was validated");
                let info = cross_stage.entry(value);
                info.def_stage = def_stage;
                info.last_use_stage = info.last_use_stage.max(stage);
            }
        }
        cross_stage
    }
}
