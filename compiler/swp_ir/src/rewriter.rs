//! Scoped rewriter: insertion-point-driven op creation, cloning and erasure.
//!
//! The rewriter borrows a [`Function`] mutably for its lifetime and keeps an
//! insertion point. Every created or cloned op is inserted immediately
//! before that point, so consecutive creations appear in creation order.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{BinOp, BlockId, CmpPred, Function, OpId, OpKind, Ty, ValueId};

/// Where the next op goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    /// Immediately before an op.
    Before(OpId),
    /// At the end of a block.
    End(BlockId),
}

/// Value and op correspondences recorded while cloning.
///
/// Pre-seeded value entries redirect operands of the cloned op; every
/// clone adds `original result → clone result` and `original op → clone op`
/// entries (nested ops and block arguments included).
#[derive(Clone, Debug, Default)]
pub struct CloneMap {
    values: FxHashMap<ValueId, ValueId>,
    ops: FxHashMap<OpId, OpId>,
}

impl CloneMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_value(&mut self, from: ValueId, to: ValueId) {
        self.values.insert(from, to);
    }

    pub fn lookup_value(&self, value: ValueId) -> Option<ValueId> {
        self.values.get(&value).copied()
    }

    /// The mapped value, or `value` itself when unmapped.
    pub fn lookup_value_or_default(&self, value: ValueId) -> ValueId {
        self.lookup_value(value).unwrap_or(value)
    }

    pub fn lookup_op(&self, op: OpId) -> Option<OpId> {
        self.ops.get(&op).copied()
    }
}

/// Builder over a mutably borrowed [`Function`].
pub struct Rewriter<'f> {
    func: &'f mut Function,
    ip: InsertPoint,
}

impl<'f> Rewriter<'f> {
    /// Create a rewriter inserting at the end of the function's entry
    /// block (before its terminator, if one exists).
    pub fn new(func: &'f mut Function) -> Self {
        let entry = func.entry();
        let ip = match func.terminator(entry) {
            Some(term) => InsertPoint::Before(term),
            None => InsertPoint::End(entry),
        };
        Rewriter { func, ip }
    }

    pub fn func(&self) -> &Function {
        &*self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut *self.func
    }

    // ── Insertion point ─────────────────────────────────────────

    pub fn insertion_point(&self) -> InsertPoint {
        self.ip
    }

    pub fn restore_insertion_point(&mut self, ip: InsertPoint) {
        self.ip = ip;
    }

    /// Insert before `op`.
    pub fn set_insertion_point(&mut self, op: OpId) {
        self.ip = InsertPoint::Before(op);
    }

    /// Insert right after `op`.
    pub fn set_insertion_point_after(&mut self, op: OpId) {
        self.ip = match self.func.position_in_block(op) {
            Some((block, pos)) => match self.func.block_ops(block).get(pos + 1) {
                Some(&next) => InsertPoint::Before(next),
                None => InsertPoint::End(block),
            },
            None => {
                tracing::warn!(%op, "insertion point after a detached op");
                self.ip
            }
        };
    }

    pub fn set_insertion_point_to_start(&mut self, block: BlockId) {
        self.ip = match self.func.block_ops(block).first() {
            Some(&first) => InsertPoint::Before(first),
            None => InsertPoint::End(block),
        };
    }

    pub fn set_insertion_point_to_end(&mut self, block: BlockId) {
        self.ip = InsertPoint::End(block);
    }

    fn insert(&mut self, op: OpId) {
        let (block, pos) = match self.ip {
            InsertPoint::Before(anchor) => {
                let place = self.func.position_in_block(anchor);
                debug_assert!(place.is_some(), "insertion anchor {anchor} is not in a block");
                place.unwrap_or_else(|| {
                    tracing::warn!(%anchor, "insertion anchor is detached, appending to the entry block");
                    let entry = self.func.entry();
                    (entry, self.func.block_ops(entry).len())
                })
            }
            InsertPoint::End(block) => (block, self.func.block_ops(block).len()),
        };
        self.func.insert_op(op, block, pos);
    }

    fn create(&mut self, kind: OpKind, operands: &[ValueId], result_tys: &[Ty]) -> OpId {
        let op = self.func.alloc_op(kind, operands, result_tys);
        self.insert(op);
        op
    }

    // ── Op builders ─────────────────────────────────────────────

    pub fn constant(&mut self, value: i64) -> ValueId {
        let op = self.create(OpKind::Const(value), &[], &[Ty::Int]);
        self.func.result(op, 0)
    }

    pub fn binary(&mut self, bin: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let op = self.create(OpKind::Binary(bin), &[lhs, rhs], &[Ty::Int]);
        self.func.result(op, 0)
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn cmp(&mut self, pred: CmpPred, lhs: ValueId, rhs: ValueId) -> ValueId {
        let op = self.create(OpKind::Cmp(pred), &[lhs, rhs], &[Ty::Bool]);
        self.func.result(op, 0)
    }

    pub fn select(&mut self, cond: ValueId, then_value: ValueId, else_value: ValueId) -> ValueId {
        let ty = self.func.value_ty(then_value);
        let op = self.create(OpKind::Select, &[cond, then_value, else_value], &[ty]);
        self.func.result(op, 0)
    }

    pub fn load(&mut self, addr: ValueId) -> ValueId {
        let op = self.create(OpKind::Load, &[addr], &[Ty::Int]);
        self.func.result(op, 0)
    }

    pub fn store(&mut self, value: ValueId, addr: ValueId) -> OpId {
        self.create(OpKind::Store, &[value, addr], &[])
    }

    pub fn yield_op(&mut self, values: &[ValueId]) -> OpId {
        self.create(OpKind::Yield, values, &[])
    }

    pub fn return_op(&mut self, values: &[ValueId]) -> OpId {
        self.create(OpKind::Return, values, &[])
    }

    /// Create a counted loop with an empty body.
    ///
    /// The body block takes `[iv, iter_args...]`. When there are no iter
    /// args the body gets a default empty `Yield`, like a structured-loop
    /// builder would; callers building their own terminator erase it.
    pub fn create_for(&mut self, lb: ValueId, ub: ValueId, step: ValueId, inits: &[ValueId]) -> OpId {
        let mut operands: SmallVec<[ValueId; 8]> = SmallVec::new();
        operands.extend([lb, ub, step]);
        operands.extend(inits.iter().copied());
        let result_tys: SmallVec<[Ty; 4]> = inits.iter().map(|&v| self.func.value_ty(v)).collect();
        let op = self.create(OpKind::For, &operands, &result_tys);

        let mut arg_tys: SmallVec<[Ty; 4]> = SmallVec::new();
        arg_tys.push(Ty::Int);
        arg_tys.extend(result_tys.iter().copied());
        let body = self.func.add_region(op, &arg_tys);
        if inits.is_empty() {
            let term = self.func.alloc_op(OpKind::Yield, &[], &[]);
            self.func.insert_op(term, body, 0);
        }
        op
    }

    /// Create an `If` with empty then/else blocks.
    pub fn create_if(&mut self, cond: ValueId, result_tys: &[Ty]) -> OpId {
        let op = self.create(OpKind::If, &[cond], result_tys);
        self.func.add_region(op, &[]);
        self.func.add_region(op, &[]);
        op
    }

    // ── Cloning ─────────────────────────────────────────────────

    /// Deep-clone `op` at the insertion point with a fresh mapping.
    pub fn clone_op(&mut self, op: OpId) -> OpId {
        let mut map = CloneMap::new();
        self.clone_op_with(op, &mut map)
    }

    /// Deep-clone `op` at the insertion point, remapping operands through
    /// `map` and recording the new correspondences in it.
    pub fn clone_op_with(&mut self, op: OpId, map: &mut CloneMap) -> OpId {
        let new_op = self.clone_detached(op, map);
        self.insert(new_op);
        new_op
    }

    fn clone_detached(&mut self, op: OpId, map: &mut CloneMap) -> OpId {
        let kind = self.func.kind(op);
        let operands: SmallVec<[ValueId; 8]> = self
            .func
            .operands(op)
            .iter()
            .map(|&v| map.lookup_value_or_default(v))
            .collect();
        let result_tys: SmallVec<[Ty; 4]> = self
            .func
            .results(op)
            .iter()
            .map(|&v| self.func.value_ty(v))
            .collect();
        let new_op = self.func.alloc_op(kind, &operands, &result_tys);
        self.func.ops[new_op.index()].attrs = self.func.ops[op.index()].attrs.clone();
        map.ops.insert(op, new_op);
        for i in 0..result_tys.len() {
            map.map_value(self.func.result(op, i), self.func.result(new_op, i));
        }

        let regions: SmallVec<[BlockId; 2]> = self.func.regions(op).iter().copied().collect();
        for region in regions {
            let arg_tys: SmallVec<[Ty; 4]> = self
                .func
                .block_args(region)
                .iter()
                .map(|&v| self.func.value_ty(v))
                .collect();
            let new_block = self.func.add_region(new_op, &arg_tys);
            for i in 0..arg_tys.len() {
                map.map_value(
                    self.func.block_args(region)[i],
                    self.func.block_args(new_block)[i],
                );
            }
            let nested: Vec<OpId> = self.func.block_ops(region).to_vec();
            for (pos, nested_op) in nested.into_iter().enumerate() {
                let new_nested = self.clone_detached(nested_op, map);
                self.func.insert_op(new_nested, new_block, pos);
            }
        }
        new_op
    }

    // ── Erasure and replacement ─────────────────────────────────

    /// Detach `op` and mark it (and everything nested) erased.
    pub fn erase_op(&mut self, op: OpId) {
        if let InsertPoint::Before(anchor) = self.ip {
            if anchor == op {
                self.set_insertion_point_after(op);
            }
        }
        self.func.detach_op(op);
        self.func.mark_erased(op);
    }

    /// Replace every use of `op`'s results with `values`, then erase it.
    pub fn replace_op(&mut self, op: OpId, values: &[ValueId]) {
        debug_assert_eq!(self.func.results(op).len(), values.len());
        let results: SmallVec<[ValueId; 4]> = self.func.results(op).iter().copied().collect();
        for (old, &new) in results.into_iter().zip(values) {
            self.func.replace_all_uses_with(old, new);
        }
        self.erase_op(op);
    }

    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        self.func.replace_all_uses_with(old, new);
    }

    /// Move `op` to the end of `block`.
    pub fn move_op_to_end(&mut self, op: OpId, block: BlockId) {
        if let InsertPoint::Before(anchor) = self.ip {
            if anchor == op {
                self.set_insertion_point_after(op);
            }
        }
        self.func.detach_op(op);
        let pos = self.func.block_ops(block).len();
        self.func.insert_op(op, block, pos);
    }
}

#[cfg(test)]
mod tests;
