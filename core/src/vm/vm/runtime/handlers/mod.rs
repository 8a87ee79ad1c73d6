pub(super) mod arith;
pub(super) mod call;
pub(super) mod control;
pub(super) mod except;
pub(super) mod names;
pub(super) mod stack;

use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;

/// Resolved jump target of a jump-class instruction.
#[inline]
pub(super) fn target_of(instr: &Instruction) -> Result<usize, Fault> {
    instr
        .target()
        .ok_or_else(|| Fault::malformed(format!("{} at offset {} has no jump target", instr.opcode, instr.offset)))
}
