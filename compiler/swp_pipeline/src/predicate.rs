//! Stock predicate function for predicated kernels.

use swp_ir::{BinOp, OpId, OpKind, Rewriter, ValueId};

use crate::error::PredicateRejected;

/// Guard `op` with `guard` so it has no effect when the guard is false.
///
/// Pure ops that cannot trap run unguarded; their results are ignored for
/// out-of-range iterations. Stores, loads and divisions are moved into an
/// `If` whose else branch yields `0` for each result. Anything with
/// regions is rejected.
pub fn predicate_op(rewriter: &mut Rewriter<'_>, op: OpId, guard: ValueId) -> Result<OpId, PredicateRejected> {
    let kind = rewriter.func().kind(op);
    let may_trap = matches!(kind, OpKind::Binary(BinOp::Div | BinOp::Rem));
    if kind.is_pure() && !may_trap {
        return Ok(op);
    }
    if !matches!(kind, OpKind::Load | OpKind::Store) && !may_trap {
        return Err(PredicateRejected { op });
    }

    let results = rewriter.func().results(op).to_vec();
    let result_tys: Vec<_> = results.iter().map(|&v| rewriter.func().value_ty(v)).collect();
    rewriter.set_insertion_point(op);
    let if_op = rewriter.create_if(guard, &result_tys);
    let then_block = rewriter.func().regions(if_op)[0];
    let else_block = rewriter.func().regions(if_op)[1];

    rewriter.move_op_to_end(op, then_block);
    rewriter.set_insertion_point_to_end(then_block);
    rewriter.yield_op(&results);

    rewriter.set_insertion_point_to_end(else_block);
    let fallback: Vec<ValueId> = results.iter().map(|_| rewriter.constant(0)).collect();
    rewriter.yield_op(&fallback);

    for (index, &old) in results.iter().enumerate() {
        let new = rewriter.func().result(if_op, index);
        replace_uses_outside(rewriter, if_op, old, new);
    }
    rewriter.set_insertion_point_after(if_op);
    Ok(if_op)
}

/// Redirect uses of `old` that are not nested in `scope`.
fn replace_uses_outside(rewriter: &mut Rewriter<'_>, scope: OpId, old: ValueId, new: ValueId) {
    let uses = rewriter.func().uses(old);
    for slot in uses {
        if !rewriter.func().is_ancestor(scope, slot.op) {
            rewriter.func_mut().set_operand(slot.op, slot.index, new);
        }
    }
}
