//! Structural verifier.
//!
//! Checks the invariants every rewrite must leave intact:
//!
//! - each operand is visible at its use: defined earlier in the same
//!   block, earlier in an enclosing block, or an argument of an enclosing
//!   block;
//! - each region block ends in `Yield` with the arity its parent expects;
//! - the entry block ends in `Return`;
//! - no live op is marked erased.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, Function, OpId, OpKind, ValueId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("{op} uses {value}, which is not visible at that point")]
    NotVisible { op: OpId, value: ValueId },
    #[error("block {block} does not end in a terminator")]
    MissingTerminator { block: BlockId },
    #[error("{op} yields {found} values, its parent expects {expected}")]
    YieldArity { op: OpId, expected: usize, found: usize },
    #[error("erased {op} is still linked into the function")]
    ErasedOpLinked { op: OpId },
    #[error("{op} is a terminator in the middle of a block")]
    MisplacedTerminator { op: OpId },
}

/// Verify `func`, returning the first violation found.
pub fn verify(func: &Function) -> Result<(), VerifyError> {
    let mut scope: Vec<FxHashSet<ValueId>> = Vec::new();
    verify_block(func, func.entry(), None, &mut scope)
}

fn verify_block(
    func: &Function,
    block: BlockId,
    expected_yield: Option<usize>,
    scope: &mut Vec<FxHashSet<ValueId>>,
) -> Result<(), VerifyError> {
    scope.push(func.block_args(block).iter().copied().collect());
    let ops = func.block_ops(block);
    let Some(&last) = ops.last() else {
        return Err(VerifyError::MissingTerminator { block });
    };
    for &op in ops {
        if func.is_erased(op) {
            return Err(VerifyError::ErasedOpLinked { op });
        }
        if func.kind(op).is_terminator() && op != last {
            return Err(VerifyError::MisplacedTerminator { op });
        }
        for &value in func.operands(op) {
            if !scope.iter().any(|visible| visible.contains(&value)) {
                return Err(VerifyError::NotVisible { op, value });
            }
        }
        for &region in func.regions(op) {
            let arity = match func.kind(op) {
                OpKind::For | OpKind::If => func.results(op).len(),
                _ => 0,
            };
            verify_block(func, region, Some(arity), scope)?;
        }
        if let Some(top) = scope.last_mut() {
            top.extend(func.results(op).iter().copied());
        }
    }
    match (func.kind(last), expected_yield) {
        (OpKind::Yield, Some(expected)) => {
            let found = func.operands(last).len();
            if found != expected {
                return Err(VerifyError::YieldArity {
                    op: last,
                    expected,
                    found,
                });
            }
        }
        (OpKind::Return, None) => {}
        _ => return Err(VerifyError::MissingTerminator { block }),
    }
    scope.pop();
    Ok(())
}
