//! Textual rendering of a [`Function`].
//!
//! ```text
//! func(%0) {
//!   %1 = const 0
//!   %5 = for %2 = %1 to %3 step %4 iter(%6 = %0) {
//!     %7 = add %6, %2
//!     yield %7
//!   }
//!   return %5
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::ir::{BlockId, Function, OpId, OpKind, ValueId};

/// `Display` adapter returned by [`Function::display`].
pub struct FunctionDisplay<'a> {
    func: &'a Function,
}

impl Function {
    pub fn display(&self) -> FunctionDisplay<'_> {
        FunctionDisplay { func: self }
    }
}

fn join(values: &[ValueId]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{v}");
    }
    out
}

impl FunctionDisplay<'_> {
    fn block(&self, f: &mut fmt::Formatter<'_>, block: BlockId, depth: usize) -> fmt::Result {
        for &op in self.func.block_ops(block) {
            self.op(f, op, depth)?;
        }
        Ok(())
    }

    fn op(&self, f: &mut fmt::Formatter<'_>, op: OpId, depth: usize) -> fmt::Result {
        let func = self.func;
        let pad = "  ".repeat(depth);
        write!(f, "{pad}")?;
        let results = func.results(op);
        if !results.is_empty() {
            write!(f, "{} = ", join(results))?;
        }
        let operands = func.operands(op);
        match func.kind(op) {
            OpKind::Const(c) => write!(f, "const {c}")?,
            OpKind::Cmp(pred) => write!(f, "cmp {} {}", pred.mnemonic(), join(operands))?,
            OpKind::For => {
                let body = func.for_body(op);
                let args = func.block_args(body);
                write!(
                    f,
                    "for {} = {} to {} step {}",
                    args[0], operands[0], operands[1], operands[2]
                )?;
                if operands.len() > 3 {
                    let pairs: Vec<String> = args[1..]
                        .iter()
                        .zip(&operands[3..])
                        .map(|(a, i)| format!("{a} = {i}"))
                        .collect();
                    write!(f, " iter({})", pairs.join(", "))?;
                }
            }
            kind => {
                write!(f, "{}", kind.mnemonic())?;
                if !operands.is_empty() {
                    write!(f, " {}", join(operands))?;
                }
            }
        }
        for (key, value) in func.attrs(op) {
            write!(f, " {{{key} = {value}}}")?;
        }
        let regions = func.regions(op);
        if regions.is_empty() {
            return writeln!(f);
        }
        for (i, &region) in regions.iter().enumerate() {
            if i == 0 {
                writeln!(f, " {{")?;
            } else {
                writeln!(f, "{pad}}} else {{")?;
            }
            self.block(f, region, depth + 1)?;
        }
        writeln!(f, "{pad}}}")
    }
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func({}) {{", join(self.func.params()))?;
        self.block(f, self.func.entry(), 1)?;
        writeln!(f, "}}")
    }
}
