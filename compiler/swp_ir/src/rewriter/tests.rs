use pretty_assertions::assert_eq;

use crate::ir::{CmpPred, Function, OpKind, Ty};
use crate::verify::verify;

use super::*;

#[test]
fn consecutive_inserts_keep_creation_order() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let a = rw.constant(1);
    let b = rw.constant(2);
    let sum = rw.add(a, b);
    rw.return_op(&[sum]);
    let kinds: Vec<OpKind> = func
        .block_ops(func.entry())
        .iter()
        .map(|&op| func.kind(op))
        .collect();
    assert_eq!(
        kinds,
        vec![
            OpKind::Const(1),
            OpKind::Const(2),
            OpKind::Binary(crate::ir::BinOp::Add),
            OpKind::Return
        ]
    );
}

#[test]
fn insert_before_and_after() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let a = rw.constant(1);
    let ret = rw.return_op(&[a]);
    rw.set_insertion_point(ret);
    let b = rw.constant(2);
    let a_op = rw.func().defining_op(a).unwrap();
    rw.set_insertion_point_after(a_op);
    let c = rw.constant(3);
    let order: Vec<_> = func
        .block_ops(func.entry())
        .iter()
        .flat_map(|&op| func.results(op).to_vec())
        .collect();
    assert_eq!(order, vec![a, c, b]);
}

#[test]
fn new_rewriter_inserts_before_return() {
    let mut func = Function::new(&[]);
    {
        let mut rw = Rewriter::new(&mut func);
        let a = rw.constant(1);
        rw.return_op(&[a]);
    }
    let mut rw = Rewriter::new(&mut func);
    rw.constant(9);
    let last = *func.block_ops(func.entry()).last().unwrap();
    assert_eq!(func.kind(last), OpKind::Return);
}

#[test]
fn create_for_default_terminator_only_without_iter_args() {
    let mut func = Function::new(&[Ty::Int]);
    let mut rw = Rewriter::new(&mut func);
    let init = rw.func().params()[0];
    let lb = rw.constant(0);
    let ub = rw.constant(4);
    let step = rw.constant(1);
    let bare = rw.create_for(lb, ub, step, &[]);
    let carried = rw.create_for(lb, ub, step, &[init]);

    let bare_body = func.for_body(bare);
    assert!(func.terminator(bare_body).is_some());
    let carried_body = func.for_body(carried);
    assert!(func.block_ops(carried_body).is_empty());
    assert_eq!(func.block_args(carried_body).len(), 2);
    assert_eq!(func.results(carried).len(), 1);
}

#[test]
fn deep_clone_remaps_nested_operands() {
    let mut func = Function::new(&[Ty::Int, Ty::Int]);
    let mut rw = Rewriter::new(&mut func);
    let p0 = rw.func().params()[0];
    let p1 = rw.func().params()[1];
    let cond = rw.cmp(CmpPred::Slt, p0, p1);
    let if_op = rw.create_if(cond, &[Ty::Int]);
    let then_block = rw.func().regions(if_op)[0];
    let else_block = rw.func().regions(if_op)[1];
    rw.set_insertion_point_to_end(then_block);
    let sum = rw.add(p0, p1);
    rw.yield_op(&[sum]);
    rw.set_insertion_point_to_end(else_block);
    rw.yield_op(&[p0]);
    rw.set_insertion_point_after(if_op);
    rw.func_mut().set_attr(if_op, "tag", 7);

    let mut map = CloneMap::new();
    map.map_value(p0, p1);
    let clone = rw.clone_op_with(if_op, &mut map);
    let result = rw.func().result(clone, 0);
    rw.return_op(&[result]);

    assert_eq!(func.attr(clone, "tag"), Some(7));
    assert_eq!(map.lookup_value(func.result(if_op, 0)), Some(result));
    let new_then = func.regions(clone)[0];
    let new_add = func.block_ops(new_then)[0];
    assert_eq!(map.lookup_op(func.block_ops(then_block)[0]), Some(new_add));
    // p0 was redirected to p1 everywhere inside the clone.
    assert_eq!(func.operands(new_add), &[p1, p1]);
    let new_else_yield = func.block_ops(func.regions(clone)[1])[0];
    assert_eq!(func.operands(new_else_yield), &[p1]);
    // The original is untouched.
    assert_eq!(func.operands(func.block_ops(then_block)[0]), &[p0, p1]);
    assert_eq!(verify(&func), Ok(()));
}

#[test]
fn replace_op_redirects_uses_and_erases() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let a = rw.constant(1);
    let b = rw.constant(2);
    let sum = rw.add(a, b);
    rw.return_op(&[sum]);
    let sum_op = func.defining_op(sum).unwrap();

    let mut rw = Rewriter::new(&mut func);
    rw.set_insertion_point(sum_op);
    let c = rw.constant(5);
    rw.replace_op(sum_op, &[c]);

    assert!(func.is_erased(sum_op));
    let ret = func.terminator(func.entry()).unwrap();
    assert_eq!(func.operands(ret), &[c]);
    assert_eq!(verify(&func), Ok(()));
}

#[test]
fn erase_marks_nested_ops() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let lb = rw.constant(0);
    let ub = rw.constant(4);
    let step = rw.constant(1);
    let for_op = rw.create_for(lb, ub, step, &[]);
    let body = rw.func().for_body(for_op);
    let term = rw.func().block_ops(body)[0];
    rw.erase_op(for_op);
    assert!(func.is_erased(for_op));
    assert!(func.is_erased(term));
    assert!(!func.block_ops(func.entry()).contains(&for_op));
}

#[test]
fn move_op_between_blocks() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let one = rw.constant(1);
    let cond = rw.cmp(CmpPred::Eq, one, one);
    let store = rw.store(one, one);
    let if_op = rw.create_if(cond, &[]);
    let then_block = rw.func().regions(if_op)[0];
    rw.move_op_to_end(store, then_block);
    assert_eq!(func.parent_block(store), Some(then_block));
    assert_eq!(func.parent_op(store), Some(if_op));
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "is not in a block"))]
fn detached_anchor_falls_back_to_entry() {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let one = rw.constant(1);
    let gone = rw.func().defining_op(one).unwrap();
    rw.erase_op(gone);
    rw.set_insertion_point(gone);
    let two = rw.constant(2);
    let placed = rw.func().defining_op(two).unwrap();
    assert_eq!(func.block_ops(func.entry()), &[placed]);
}
