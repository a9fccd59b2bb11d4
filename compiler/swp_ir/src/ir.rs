//! Region-based IR graph.
//!
//! A [`Function`] owns three arenas: operations, values and blocks. Every
//! cross-reference is an index newtype ([`OpId`], [`ValueId`], [`BlockId`]),
//! so cloned and erased nodes never alias and rewrites can hold IDs across
//! mutations without borrow conflicts.
//!
//! # Structure
//!
//! - **Operations** have ordered operands, ordered results, a parent block,
//!   string-keyed integer attributes, and zero or more nested regions.
//! - **Regions** are single blocks. A `For` op has one region whose block
//!   arguments are `[iv, iter_args...]`; an `If` op has a then- and an
//!   else-region. Both are terminated by `Yield`.
//! - **Values** are either an op result or a block argument.
//!
//! Erased ops stay in the arena (marked dead) so stale IDs are detectable;
//! they are detached from their parent block and never visited by walks.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Operation ID within a [`Function`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct OpId(u32);

impl OpId {
    /// Create an operation ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into arenas).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// SSA value ID within a [`Function`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    /// Create a value ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into arenas).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Block ID within a [`Function`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into arenas).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

// ── Types and operation kinds ───────────────────────────────────────

/// Value type. Integers double as loop indices and memory addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ty {
    Int,
    Bool,
}

/// Integer binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
        }
    }
}

/// Signed integer comparison predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
        }
    }

    /// Evaluate the predicate on two signed integers.
    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpPred::Eq => lhs == rhs,
            CmpPred::Ne => lhs != rhs,
            CmpPred::Slt => lhs < rhs,
            CmpPred::Sle => lhs <= rhs,
            CmpPred::Sgt => lhs > rhs,
            CmpPred::Sge => lhs >= rhs,
        }
    }
}

/// What an operation does.
///
/// Operand and region conventions:
///
/// | Kind | Operands | Regions | Results |
/// |------|----------|---------|---------|
/// | `Const` | - | - | 1 |
/// | `Binary` / `Cmp` | `lhs, rhs` | - | 1 |
/// | `Select` | `cond, then, else` | - | 1 |
/// | `Load` | `addr` | - | 1 |
/// | `Store` | `value, addr` | - | - |
/// | `For` | `lb, ub, step, inits...` | body | one per init |
/// | `If` | `cond` | then, else | any |
/// | `Yield` / `Return` | values | - | - |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpKind {
    Const(i64),
    Binary(BinOp),
    Cmp(CmpPred),
    Select,
    Load,
    Store,
    For,
    If,
    Yield,
    Return,
}

impl OpKind {
    /// Returns `true` for ops that end a block.
    pub fn is_terminator(self) -> bool {
        matches!(self, OpKind::Yield | OpKind::Return)
    }

    /// Returns `true` for ops without memory effects or regions.
    pub fn is_pure(self) -> bool {
        matches!(
            self,
            OpKind::Const(_) | OpKind::Binary(_) | OpKind::Cmp(_) | OpKind::Select
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpKind::Const(_) => "const",
            OpKind::Binary(op) => op.mnemonic(),
            OpKind::Cmp(_) => "cmp",
            OpKind::Select => "select",
            OpKind::Load => "load",
            OpKind::Store => "store",
            OpKind::For => "for",
            OpKind::If => "if",
            OpKind::Yield => "yield",
            OpKind::Return => "return",
        }
    }
}

// ── Arena entries ───────────────────────────────────────────────────

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueDef {
    /// The `index`-th result of `op`.
    Result { op: OpId, index: u32 },
    /// The `index`-th argument of `block`.
    BlockArg { block: BlockId, index: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct ValueData {
    pub(crate) def: ValueDef,
    pub(crate) ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct OpData {
    pub(crate) kind: OpKind,
    pub(crate) operands: SmallVec<[ValueId; 4]>,
    pub(crate) results: SmallVec<[ValueId; 2]>,
    pub(crate) regions: SmallVec<[BlockId; 2]>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) attrs: BTreeMap<String, i64>,
    pub(crate) erased: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct BlockData {
    pub(crate) args: SmallVec<[ValueId; 4]>,
    pub(crate) ops: Vec<OpId>,
    pub(crate) parent: Option<OpId>,
}

/// A single operand slot: operand `index` of `op`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperandRef {
    pub op: OpId,
    pub index: usize,
}

// ── Functions ───────────────────────────────────────────────────────

/// A function body: the arenas plus the entry block.
///
/// The entry block's arguments are the function parameters and it is
/// terminated by `Return`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    pub(crate) ops: Vec<OpData>,
    pub(crate) values: Vec<ValueData>,
    pub(crate) blocks: Vec<BlockData>,
    pub(crate) entry: BlockId,
}

fn to_u32(n: usize, what: &str) -> u32 {
    u32::try_from(n).unwrap_or_else(|_| panic!("{what} count exceeds u32::MAX"))
}

impl Function {
    /// Create an empty function whose entry block takes `params`.
    pub fn new(params: &[Ty]) -> Self {
        let mut func = Function {
            ops: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            entry: BlockId::new(0),
        };
        func.entry = func.alloc_block(params, None);
        func
    }

    // ── Allocation (used by the rewriter) ───────────────────────

    pub(crate) fn alloc_block(&mut self, arg_tys: &[Ty], parent: Option<OpId>) -> BlockId {
        let id = BlockId::new(to_u32(self.blocks.len(), "block"));
        let args = arg_tys
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                self.alloc_value(
                    ValueDef::BlockArg {
                        block: id,
                        index: to_u32(i, "block argument"),
                    },
                    ty,
                )
            })
            .collect();
        self.blocks.push(BlockData {
            args,
            ops: Vec::new(),
            parent,
        });
        id
    }

    fn alloc_value(&mut self, def: ValueDef, ty: Ty) -> ValueId {
        let id = ValueId::new(to_u32(self.values.len(), "value"));
        self.values.push(ValueData { def, ty });
        id
    }

    /// Allocate a detached op. The caller inserts it into a block.
    pub(crate) fn alloc_op(&mut self, kind: OpKind, operands: &[ValueId], result_tys: &[Ty]) -> OpId {
        let id = OpId::new(to_u32(self.ops.len(), "op"));
        let results = result_tys
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                self.alloc_value(
                    ValueDef::Result {
                        op: id,
                        index: to_u32(i, "result"),
                    },
                    ty,
                )
            })
            .collect();
        self.ops.push(OpData {
            kind,
            operands: operands.iter().copied().collect(),
            results,
            regions: SmallVec::new(),
            parent: None,
            attrs: BTreeMap::new(),
            erased: false,
        });
        id
    }

    /// Append a fresh single-block region to `op`.
    pub(crate) fn add_region(&mut self, op: OpId, arg_tys: &[Ty]) -> BlockId {
        let block = self.alloc_block(arg_tys, Some(op));
        self.ops[op.index()].regions.push(block);
        block
    }

    pub(crate) fn insert_op(&mut self, op: OpId, block: BlockId, pos: usize) {
        debug_assert!(self.ops[op.index()].parent.is_none(), "{op} already placed");
        self.blocks[block.index()].ops.insert(pos, op);
        self.ops[op.index()].parent = Some(block);
    }

    /// Remove `op` from its parent block without erasing it.
    pub(crate) fn detach_op(&mut self, op: OpId) {
        if let Some(block) = self.ops[op.index()].parent.take() {
            self.blocks[block.index()].ops.retain(|&o| o != op);
        }
    }

    /// Mark `op` and everything nested in it as erased.
    pub(crate) fn mark_erased(&mut self, op: OpId) {
        for nested in self.walk(op) {
            self.ops[nested.index()].erased = true;
        }
    }

    /// Position of `op` within its parent block.
    pub(crate) fn position_in_block(&self, op: OpId) -> Option<(BlockId, usize)> {
        let block = self.ops[op.index()].parent?;
        let pos = self.blocks[block.index()].ops.iter().position(|&o| o == op)?;
        Some((block, pos))
    }

    // ── Operation queries ───────────────────────────────────────

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// The function parameters (entry block arguments).
    pub fn params(&self) -> &[ValueId] {
        self.block_args(self.entry)
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn kind(&self, op: OpId) -> OpKind {
        self.ops[op.index()].kind
    }

    pub fn operands(&self, op: OpId) -> &[ValueId] {
        &self.ops[op.index()].operands
    }

    pub fn operand(&self, op: OpId, index: usize) -> ValueId {
        self.ops[op.index()].operands[index]
    }

    pub fn results(&self, op: OpId) -> &[ValueId] {
        &self.ops[op.index()].results
    }

    pub fn result(&self, op: OpId, index: usize) -> ValueId {
        self.ops[op.index()].results[index]
    }

    pub fn regions(&self, op: OpId) -> &[BlockId] {
        &self.ops[op.index()].regions
    }

    /// The block `op` lives in, or `None` if detached.
    pub fn parent_block(&self, op: OpId) -> Option<BlockId> {
        self.ops[op.index()].parent
    }

    /// The op whose region contains `op`.
    pub fn parent_op(&self, op: OpId) -> Option<OpId> {
        self.parent_block(op).and_then(|b| self.block_parent_op(b))
    }

    pub fn is_erased(&self, op: OpId) -> bool {
        self.ops[op.index()].erased
    }

    pub fn attr(&self, op: OpId, key: &str) -> Option<i64> {
        self.ops[op.index()].attrs.get(key).copied()
    }

    pub fn attrs(&self, op: OpId) -> &BTreeMap<String, i64> {
        &self.ops[op.index()].attrs
    }

    pub fn set_attr(&mut self, op: OpId, key: &str, value: i64) {
        self.ops[op.index()].attrs.insert(key.to_owned(), value);
    }

    // ── Value queries ───────────────────────────────────────────

    pub fn value_ty(&self, value: ValueId) -> Ty {
        self.values[value.index()].ty
    }

    pub fn value_def(&self, value: ValueId) -> ValueDef {
        self.values[value.index()].def
    }

    /// The op producing `value`, or `None` for block arguments.
    pub fn defining_op(&self, value: ValueId) -> Option<OpId> {
        match self.value_def(value) {
            ValueDef::Result { op, .. } => Some(op),
            ValueDef::BlockArg { .. } => None,
        }
    }

    /// The owning block and position of a block argument.
    pub fn block_arg_owner(&self, value: ValueId) -> Option<(BlockId, usize)> {
        match self.value_def(value) {
            ValueDef::BlockArg { block, index } => Some((block, index as usize)),
            ValueDef::Result { .. } => None,
        }
    }

    /// The integer held by `value` if it is produced by a `Const` op.
    pub fn const_value(&self, value: ValueId) -> Option<i64> {
        match self.defining_op(value).map(|op| self.kind(op)) {
            Some(OpKind::Const(c)) => Some(c),
            _ => None,
        }
    }

    // ── Block queries ───────────────────────────────────────────

    pub fn block_args(&self, block: BlockId) -> &[ValueId] {
        &self.blocks[block.index()].args
    }

    pub fn block_ops(&self, block: BlockId) -> &[OpId] {
        &self.blocks[block.index()].ops
    }

    /// The op whose region is `block`; `None` for the entry block.
    pub fn block_parent_op(&self, block: BlockId) -> Option<OpId> {
        self.blocks[block.index()].parent
    }

    /// The block's last op if it is a terminator.
    pub fn terminator(&self, block: BlockId) -> Option<OpId> {
        self.block_ops(block)
            .last()
            .copied()
            .filter(|&op| self.kind(op).is_terminator())
    }

    /// The block's ops without its terminator.
    pub fn ops_without_terminator(&self, block: BlockId) -> &[OpId] {
        let ops = self.block_ops(block);
        match self.terminator(block) {
            Some(_) => &ops[..ops.len() - 1],
            None => ops,
        }
    }

    // ── Structure ───────────────────────────────────────────────

    /// Returns `true` if `op` is `ancestor` or nested (at any depth) in
    /// one of its regions.
    pub fn is_ancestor(&self, ancestor: OpId, op: OpId) -> bool {
        let mut cur = Some(op);
        while let Some(o) = cur {
            if o == ancestor {
                return true;
            }
            cur = self.parent_op(o);
        }
        false
    }

    /// Returns `true` if `value` is defined inside one of `op`'s regions
    /// (by a nested op or as a nested block argument).
    pub fn is_defined_within(&self, op: OpId, value: ValueId) -> bool {
        match self.value_def(value) {
            ValueDef::Result { op: def, .. } => def != op && self.is_ancestor(op, def),
            ValueDef::BlockArg { block, .. } => self
                .block_parent_op(block)
                .is_some_and(|owner| self.is_ancestor(op, owner)),
        }
    }

    /// Pre-order walk: `op` first, then every op nested in its regions.
    pub fn walk(&self, op: OpId) -> Vec<OpId> {
        let mut out = Vec::new();
        let mut stack = vec![op];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            // Push in reverse so the first nested op is visited first.
            for &region in self.regions(cur).iter().rev() {
                for &nested in self.block_ops(region).iter().rev() {
                    stack.push(nested);
                }
            }
        }
        out
    }

    /// Every live op reachable from the entry block, in pre-order.
    pub fn all_ops(&self) -> Vec<OpId> {
        self.block_ops(self.entry)
            .iter()
            .flat_map(|&op| self.walk(op))
            .collect()
    }

    /// Operands of ops nested in `op` that reference values defined
    /// outside of `op`.
    pub fn used_values_defined_above(&self, op: OpId) -> Vec<OperandRef> {
        let mut out = Vec::new();
        for nested in self.walk(op).into_iter().skip(1) {
            for (index, &value) in self.operands(nested).iter().enumerate() {
                if !self.is_defined_within(op, value) {
                    out.push(OperandRef { op: nested, index });
                }
            }
        }
        out
    }

    /// Every operand slot of a live op that reads `value`.
    pub fn uses(&self, value: ValueId) -> Vec<OperandRef> {
        let mut out = Vec::new();
        for op in self.all_ops() {
            for (index, &operand) in self.operands(op).iter().enumerate() {
                if operand == value {
                    out.push(OperandRef { op, index });
                }
            }
        }
        out
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        self.all_ops()
            .into_iter()
            .any(|op| self.operands(op).contains(&value))
    }

    // ── Operand mutation ────────────────────────────────────────

    pub fn set_operand(&mut self, op: OpId, index: usize, value: ValueId) {
        self.ops[op.index()].operands[index] = value;
    }

    /// Redirect every live use of `old` to `new`.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        for OperandRef { op, index } in self.uses(old) {
            self.set_operand(op, index, new);
        }
    }

    // ── Counted loops ───────────────────────────────────────────

    pub fn for_lower_bound(&self, for_op: OpId) -> ValueId {
        debug_assert_eq!(self.kind(for_op), OpKind::For);
        self.operand(for_op, 0)
    }

    pub fn for_upper_bound(&self, for_op: OpId) -> ValueId {
        debug_assert_eq!(self.kind(for_op), OpKind::For);
        self.operand(for_op, 1)
    }

    pub fn for_step(&self, for_op: OpId) -> ValueId {
        debug_assert_eq!(self.kind(for_op), OpKind::For);
        self.operand(for_op, 2)
    }

    /// Initial values of the loop-carried arguments.
    pub fn for_inits(&self, for_op: OpId) -> &[ValueId] {
        debug_assert_eq!(self.kind(for_op), OpKind::For);
        &self.operands(for_op)[3..]
    }

    pub fn for_body(&self, for_op: OpId) -> BlockId {
        debug_assert_eq!(self.kind(for_op), OpKind::For);
        self.regions(for_op)[0]
    }

    pub fn for_induction_var(&self, for_op: OpId) -> ValueId {
        self.block_args(self.for_body(for_op))[0]
    }

    /// Loop-carried block arguments (body arguments after the iv).
    pub fn for_iter_args(&self, for_op: OpId) -> &[ValueId] {
        &self.block_args(self.for_body(for_op))[1..]
    }

    /// Values the body yields for the next iteration.
    pub fn for_yielded(&self, for_op: OpId) -> &[ValueId] {
        match self.terminator(self.for_body(for_op)) {
            Some(term) => self.operands(term),
            None => &[],
        }
    }
}
