pub(super) use std::sync::Arc;

pub(super) use crate::op::CompareOp;
pub(super) use crate::val::{ExcType, Exception, Val};
pub(super) use crate::vm::{
    CodeBuilder, CodeUnit, FailureKind, Opcode, Vm, VmContext, VmError, VmOptions,
};

/// Run `unit` as module code on a fresh VM with captured output.
pub(super) fn exec_unit(unit: CodeUnit) -> Result<Val, VmError> {
    let mut ctx = VmContext::new().capture_output();
    exec_in(unit, &mut ctx)
}

pub(super) fn exec_in(unit: CodeUnit, ctx: &mut VmContext) -> Result<Val, VmError> {
    let mut vm = Vm::new();
    let out = vm.execute(&Arc::new(unit), ctx);
    assert_eq!(vm.frame_depth(), 0, "a finished run leaves no frames");
    out
}

/// Raw unit that skips builder validation, for malformed-code scenarios.
pub(super) fn raw_unit(code: Vec<u8>) -> CodeUnit {
    CodeUnit {
        code,
        ..CodeUnit::new("raw")
    }
}

mod control_flow;
mod decode;
mod exceptions;
mod straight_line;
