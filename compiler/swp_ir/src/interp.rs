//! Reference interpreter.
//!
//! Executes a [`Function`] over a flat integer memory. Booleans are `0`/`1`.
//! The result records returned values, the final memory image and the
//! ordered trace of stores, which is what equivalence checks compare
//! before and after a rewrite.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{BinOp, BlockId, Function, OpId, OpKind, ValueId};

/// Upper bound on executed ops, so a malformed loop cannot hang a test.
const DEFAULT_FUEL: u64 = 1 << 24;

/// Evaluation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("value {0} used before definition")]
    UndefinedValue(ValueId),
    #[error("loop {op} has non-positive step {step}")]
    NonPositiveStep { op: OpId, step: i64 },
    #[error("division by zero in {0}")]
    DivisionByZero(OpId),
    #[error("block {0} has no terminator")]
    MissingTerminator(BlockId),
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("execution exceeded its step budget")]
    FuelExhausted,
}

/// One executed `Store`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreEvent {
    pub addr: i64,
    pub value: i64,
}

/// Observable outcome of running a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Execution {
    pub returned: Vec<i64>,
    pub memory: BTreeMap<i64, i64>,
    pub stores: Vec<StoreEvent>,
}

impl Execution {
    /// Stores grouped by address, each group in program order.
    ///
    /// Pipelining reorders stores from different iterations, so this is
    /// the order-insensitive view equivalence checks compare.
    pub fn stores_by_addr(&self) -> BTreeMap<i64, Vec<i64>> {
        let mut out: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for event in &self.stores {
            out.entry(event.addr).or_default().push(event.value);
        }
        out
    }
}

/// Run `func` with `args` over an initial `memory` image.
pub fn run(func: &Function, args: &[i64], memory: BTreeMap<i64, i64>) -> Result<Execution, EvalError> {
    let params = func.params();
    if params.len() != args.len() {
        return Err(EvalError::ArgumentCount {
            expected: params.len(),
            found: args.len(),
        });
    }
    let mut machine = Machine {
        func,
        env: FxHashMap::default(),
        memory,
        stores: Vec::new(),
        fuel: DEFAULT_FUEL,
    };
    for (&param, &arg) in params.iter().zip(args) {
        machine.env.insert(param, arg);
    }
    let returned = machine.exec_block(func.entry())?.to_vec();
    Ok(Execution {
        returned,
        memory: machine.memory,
        stores: machine.stores,
    })
}

struct Machine<'a> {
    func: &'a Function,
    env: FxHashMap<ValueId, i64>,
    memory: BTreeMap<i64, i64>,
    stores: Vec<StoreEvent>,
    fuel: u64,
}

impl Machine<'_> {
    fn get(&self, value: ValueId) -> Result<i64, EvalError> {
        self.env
            .get(&value)
            .copied()
            .ok_or(EvalError::UndefinedValue(value))
    }

    fn operand(&self, op: OpId, index: usize) -> Result<i64, EvalError> {
        self.get(self.func.operand(op, index))
    }

    /// Execute a block up to its terminator and return the terminator's
    /// operand values.
    fn exec_block(&mut self, block: BlockId) -> Result<SmallVec<[i64; 4]>, EvalError> {
        let func = self.func;
        for &op in func.block_ops(block) {
            if func.kind(op).is_terminator() {
                return func
                    .operands(op)
                    .iter()
                    .map(|&v| self.get(v))
                    .collect();
            }
            self.exec_op(op)?;
        }
        Err(EvalError::MissingTerminator(block))
    }

    fn exec_op(&mut self, op: OpId) -> Result<(), EvalError> {
        self.fuel = self.fuel.checked_sub(1).ok_or(EvalError::FuelExhausted)?;
        let func = self.func;
        let value = match func.kind(op) {
            OpKind::Const(c) => c,
            OpKind::Binary(bin) => {
                let lhs = self.operand(op, 0)?;
                let rhs = self.operand(op, 1)?;
                match bin {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Sub => lhs.wrapping_sub(rhs),
                    BinOp::Mul => lhs.wrapping_mul(rhs),
                    BinOp::Div | BinOp::Rem if rhs == 0 => {
                        return Err(EvalError::DivisionByZero(op));
                    }
                    BinOp::Div => lhs.wrapping_div(rhs),
                    BinOp::Rem => lhs.wrapping_rem(rhs),
                }
            }
            OpKind::Cmp(pred) => i64::from(pred.eval(self.operand(op, 0)?, self.operand(op, 1)?)),
            OpKind::Select => {
                if self.operand(op, 0)? != 0 {
                    self.operand(op, 1)?
                } else {
                    self.operand(op, 2)?
                }
            }
            OpKind::Load => {
                let addr = self.operand(op, 0)?;
                self.memory.get(&addr).copied().unwrap_or(0)
            }
            OpKind::Store => {
                let value = self.operand(op, 0)?;
                let addr = self.operand(op, 1)?;
                self.memory.insert(addr, value);
                self.stores.push(StoreEvent { addr, value });
                return Ok(());
            }
            OpKind::For => return self.exec_for(op),
            OpKind::If => {
                let region = if self.operand(op, 0)? != 0 { 0 } else { 1 };
                let yielded = self.exec_block(func.regions(op)[region])?;
                for (&result, value) in func.results(op).iter().zip(yielded) {
                    self.env.insert(result, value);
                }
                return Ok(());
            }
            // Terminators are consumed by `exec_block`.
            OpKind::Yield | OpKind::Return => return Ok(()),
        };
        self.env.insert(func.result(op, 0), value);
        Ok(())
    }

    fn exec_for(&mut self, op: OpId) -> Result<(), EvalError> {
        let func = self.func;
        let lb = self.get(func.for_lower_bound(op))?;
        let ub = self.get(func.for_upper_bound(op))?;
        let step = self.get(func.for_step(op))?;
        if step <= 0 {
            return Err(EvalError::NonPositiveStep { op, step });
        }
        let mut carried: SmallVec<[i64; 4]> = func
            .for_inits(op)
            .iter()
            .map(|&v| self.get(v))
            .collect::<Result<_, _>>()?;

        let body = func.for_body(op);
        let iv = func.for_induction_var(op);
        let mut cur = lb;
        while cur < ub {
            self.env.insert(iv, cur);
            for (&arg, &value) in func.for_iter_args(op).iter().zip(&carried) {
                self.env.insert(arg, value);
            }
            carried = self.exec_block(body)?;
            cur = cur.saturating_add(step);
        }
        for (&result, value) in func.results(op).iter().zip(carried) {
            self.env.insert(result, value);
        }
        Ok(())
    }
}
