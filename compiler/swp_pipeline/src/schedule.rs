//! Attribute-driven schedules and annotations.
//!
//! Lets a front end (or a test) spell out a schedule directly on the loop
//! body: each op carries [`STAGE_ATTR`] and optionally [`ORDER_ATTR`].
//! [`annotate_part`] is the matching [`AnnotateFn`](crate::AnnotateFn) that
//! tags emitted clones with where they ended up.

use swp_ir::{Function, OpId};

use crate::options::PipelinerPart;

pub const STAGE_ATTR: &str = "pipeline.stage";
pub const ORDER_ATTR: &str = "pipeline.order";
pub const PART_ATTR: &str = "pipeline.part";
pub const PART_INDEX_ATTR: &str = "pipeline.part_index";

/// Read the schedule of `for_op` from op attributes.
///
/// Ops without a stage attribute are left out, so validation reports them.
/// Negative stages are left out too. Ordering: by [`ORDER_ATTR`] when every
/// staged op has one, otherwise by descending stage then body position, so
/// a value carried from stage `s + 1` to stage `s` is produced before it is
/// read in the kernel.
pub fn schedule_from_attrs(func: &Function, for_op: OpId) -> Vec<(OpId, u32)> {
    let body = func.for_body(for_op);
    let staged: Vec<(usize, OpId, u32)> = func
        .ops_without_terminator(body)
        .iter()
        .enumerate()
        .filter_map(|(pos, &op)| {
            let stage = u32::try_from(func.attr(op, STAGE_ATTR)?).ok()?;
            Some((pos, op, stage))
        })
        .collect();

    let orders: Option<Vec<i64>> = staged
        .iter()
        .map(|&(_, op, _)| func.attr(op, ORDER_ATTR))
        .collect();
    let mut keyed: Vec<((i64, i64), OpId, u32)> = match orders {
        Some(orders) => staged
            .iter()
            .zip(orders)
            .map(|(&(_, op, stage), order)| ((order, 0), op, stage))
            .collect(),
        None => staged
            .iter()
            .map(|&(pos, op, stage)| ((-i64::from(stage), pos as i64), op, stage))
            .collect(),
    };
    keyed.sort_by_key(|&(key, _, _)| key);
    keyed.into_iter().map(|(_, op, stage)| (op, stage)).collect()
}

/// Tag an emitted clone with its pipeline part and relative index.
pub fn annotate_part(func: &mut Function, op: OpId, part: PipelinerPart, index: u32) {
    let part_id = match part {
        PipelinerPart::Prologue => 0,
        PipelinerPart::Kernel => 1,
        PipelinerPart::Epilogue => 2,
    };
    func.set_attr(op, PART_ATTR, part_id);
    func.set_attr(op, PART_INDEX_ATTR, i64::from(index));
}
