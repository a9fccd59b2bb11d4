//! Shared test utilities for the pipelining phases.
//!
//! Loop fixtures carry their schedule as op attributes, so tests pick the
//! stock [`schedule_from_attrs`] schedule. Only compiled in test builds.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use swp_ir::interp::run;
use swp_ir::verify::verify;
use swp_ir::{BinOp, BlockId, Function, OpId, OpKind, Rewriter, Ty, ValueId};

use crate::options::PipeliningOptions;
use crate::predicate::predicate_op;
use crate::schedule::{schedule_from_attrs, STAGE_ATTR};

/// A function holding one counted loop, plus the arguments to run it with.
pub(crate) struct Fixture {
    pub(crate) func: Function,
    pub(crate) for_op: OpId,
    pub(crate) args: Vec<i64>,
}

/// Peeling options reading stages from attributes.
pub(crate) fn peel_options() -> PipeliningOptions {
    PipeliningOptions::new(schedule_from_attrs)
}

/// Predicating options reading stages from attributes.
pub(crate) fn predicate_options() -> PipeliningOptions {
    PipeliningOptions::new(schedule_from_attrs)
        .with_peel_epilogue(false)
        .with_predicate_fn(predicate_op)
}

/// Initial memory: `addr -> 3 * addr + 1` for every address a fixture reads.
pub(crate) fn memory() -> BTreeMap<i64, i64> {
    (-64..64).map(|addr| (addr, 3 * addr + 1)).collect()
}

fn stage(rw: &mut Rewriter<'_>, value: ValueId, stage: i64) {
    let op = rw.func().defining_op(value).unwrap();
    rw.func_mut().set_attr(op, STAGE_ATTR, stage);
}

fn stage_op(rw: &mut Rewriter<'_>, op: OpId, stage: i64) {
    rw.func_mut().set_attr(op, STAGE_ATTR, stage);
}

fn begin_loop(rw: &mut Rewriter<'_>, lb: i64, ub: i64, step: i64, inits: &[ValueId]) -> (OpId, BlockId) {
    let lb = rw.constant(lb);
    let ub = rw.constant(ub);
    let step = rw.constant(step);
    let for_op = rw.create_for(lb, ub, step, inits);
    let body = rw.func().for_body(for_op);
    rw.set_insertion_point_to_start(body);
    (for_op, body)
}

fn finish(mut rw: Rewriter<'_>, for_op: OpId) {
    rw.set_insertion_point_after(for_op);
    let results = rw.func().results(for_op).to_vec();
    rw.return_op(&results);
}

/// ```text
/// for iv {
///   a = load iv          // stage 0
///   b = add a, a         // stage 1
///   store b -> iv        // stage 1
/// }
/// ```
pub(crate) fn two_stage_store(lb: i64, ub: i64, step: i64) -> Fixture {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let (for_op, _) = begin_loop(&mut rw, lb, ub, step, &[]);
    let iv = rw.func().for_induction_var(for_op);
    let a = rw.load(iv);
    let b = rw.add(a, a);
    let store = rw.store(b, iv);
    stage(&mut rw, a, 0);
    stage(&mut rw, b, 1);
    stage_op(&mut rw, store, 1);
    finish(rw, for_op);
    Fixture {
        func,
        for_op,
        args: vec![],
    }
}

/// Three stages with a reduction and an iv use in the last stage:
///
/// ```text
/// for iv iter(acc = %0) {
///   x = load iv              // stage 0
///   y = mul x, x             // stage 1
///   s = add acc, y           // stage 2
///   addr = add iv, 100       // stage 2
///   store s -> addr          // stage 2
///   yield s
/// }
/// ```
pub(crate) fn reduction(lb: i64, ub: i64, step: i64) -> Fixture {
    let mut func = Function::new(&[Ty::Int]);
    let mut rw = Rewriter::new(&mut func);
    let init = rw.func().params()[0];
    let offset = rw.constant(100);
    let (for_op, _) = begin_loop(&mut rw, lb, ub, step, &[init]);
    let iv = rw.func().for_induction_var(for_op);
    let acc = rw.func().for_iter_args(for_op)[0];
    let x = rw.load(iv);
    let y = rw.binary(BinOp::Mul, x, x);
    let s = rw.add(acc, y);
    let addr = rw.add(iv, offset);
    let store = rw.store(s, addr);
    rw.yield_op(&[s]);
    stage(&mut rw, x, 0);
    stage(&mut rw, y, 1);
    stage(&mut rw, s, 2);
    stage(&mut rw, addr, 2);
    stage_op(&mut rw, store, 2);
    finish(rw, for_op);
    Fixture {
        func,
        for_op,
        args: vec![5],
    }
}

/// `x` is produced in stage 0 and read again in stage 2:
///
/// ```text
/// for iv {
///   x = load iv              // stage 0
///   y = add x, 7             // stage 1
///   z = add x, y             // stage 2
///   addr = add iv, 100       // stage 2
///   store z -> addr          // stage 2
/// }
/// ```
pub(crate) fn long_liverange(lb: i64, ub: i64, step: i64) -> Fixture {
    let mut func = Function::new(&[]);
    let mut rw = Rewriter::new(&mut func);
    let seven = rw.constant(7);
    let offset = rw.constant(100);
    let (for_op, _) = begin_loop(&mut rw, lb, ub, step, &[]);
    let iv = rw.func().for_induction_var(for_op);
    let x = rw.load(iv);
    let y = rw.add(x, seven);
    let z = rw.add(x, y);
    let addr = rw.add(iv, offset);
    let store = rw.store(z, addr);
    stage(&mut rw, x, 0);
    stage(&mut rw, y, 1);
    stage(&mut rw, z, 2);
    stage(&mut rw, addr, 2);
    stage_op(&mut rw, store, 2);
    finish(rw, for_op);
    Fixture {
        func,
        for_op,
        args: vec![],
    }
}

/// A stage-0 op reads the value its stage-1 successor yielded one
/// iteration earlier:
///
/// ```text
/// for iv iter(prev = %0) {
///   a = load iv              // stage 0
///   b = add a, prev          // stage 0
///   addr = add iv, 100       // stage 0
///   store b -> addr          // stage 0
///   c = mul a, 2             // stage 1
///   yield c
/// }
/// ```
pub(crate) fn carried_from_next_stage(lb: i64, ub: i64, step: i64) -> Fixture {
    let mut func = Function::new(&[Ty::Int]);
    let mut rw = Rewriter::new(&mut func);
    let init = rw.func().params()[0];
    let two = rw.constant(2);
    let offset = rw.constant(100);
    let (for_op, _) = begin_loop(&mut rw, lb, ub, step, &[init]);
    let iv = rw.func().for_induction_var(for_op);
    let prev = rw.func().for_iter_args(for_op)[0];
    let a = rw.load(iv);
    let b = rw.add(a, prev);
    let addr = rw.add(iv, offset);
    let store = rw.store(b, addr);
    let c = rw.binary(BinOp::Mul, a, two);
    rw.yield_op(&[c]);
    stage(&mut rw, a, 0);
    stage(&mut rw, b, 0);
    stage(&mut rw, addr, 0);
    stage_op(&mut rw, store, 0);
    stage(&mut rw, c, 1);
    finish(rw, for_op);
    Fixture {
        func,
        for_op,
        args: vec![9],
    }
}

/// A stage-0 value carried to the next iteration and read in stage 2,
/// with an `If` in the body reading values from above:
///
/// ```text
/// for iv iter(acc = %0, last = %0) {
///   x = load iv                          // stage 0
///   big = cmp sgt x, 20                  // stage 1
///   v = if big { yield x } else { yield last }   // stage 2
///   t = add acc, v                       // stage 2
///   yield t, x
/// }
/// ```
pub(crate) fn nested_region(lb: i64, ub: i64, step: i64) -> Fixture {
    let mut func = Function::new(&[Ty::Int]);
    let mut rw = Rewriter::new(&mut func);
    let init = rw.func().params()[0];
    let twenty = rw.constant(20);
    let (for_op, _) = begin_loop(&mut rw, lb, ub, step, &[init, init]);
    let iv = rw.func().for_induction_var(for_op);
    let acc = rw.func().for_iter_args(for_op)[0];
    let last = rw.func().for_iter_args(for_op)[1];
    let x = rw.load(iv);
    let big = rw.cmp(swp_ir::CmpPred::Sgt, x, twenty);
    let if_op = rw.create_if(big, &[Ty::Int]);
    let ip = rw.insertion_point();
    let then_block = rw.func().regions(if_op)[0];
    let else_block = rw.func().regions(if_op)[1];
    rw.set_insertion_point_to_end(then_block);
    rw.yield_op(&[x]);
    rw.set_insertion_point_to_end(else_block);
    rw.yield_op(&[last]);
    rw.restore_insertion_point(ip);
    let v = rw.func().result(if_op, 0);
    let t = rw.add(acc, v);
    rw.yield_op(&[t, x]);
    stage(&mut rw, x, 0);
    stage(&mut rw, big, 1);
    stage_op(&mut rw, if_op, 2);
    stage(&mut rw, t, 2);
    finish(rw, for_op);
    Fixture {
        func,
        for_op,
        args: vec![1],
    }
}

/// Every fixture, for table-driven equivalence tests.
pub(crate) fn all_fixtures() -> Vec<(&'static str, fn(i64, i64, i64) -> Fixture)> {
    vec![
        ("two_stage_store", two_stage_store),
        ("reduction", reduction),
        ("long_liverange", long_liverange),
        ("carried_from_next_stage", carried_from_next_stage),
        ("nested_region", nested_region),
    ]
}

/// Ops of `kind` directly in `block`.
pub(crate) fn count_kind(func: &Function, block: BlockId, kind: OpKind) -> usize {
    func.block_ops(block)
        .iter()
        .filter(|&&op| func.kind(op) == kind)
        .count()
}

/// The pipelined function must verify and behave exactly like the
/// original: same results, same final memory, same per-address store
/// sequence.
pub(crate) fn assert_equivalent(original: &Function, pipelined: &Function, args: &[i64]) {
    assert_eq!(verify(pipelined), Ok(()), "{}", pipelined.display());
    let expected = run(original, args, memory()).unwrap();
    let actual = run(pipelined, args, memory()).unwrap();
    assert_eq!(actual.returned, expected.returned, "{}", pipelined.display());
    assert_eq!(actual.memory, expected.memory);
    assert_eq!(actual.stores_by_addr(), expected.stores_by_addr());
}
