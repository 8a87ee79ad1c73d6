use std::sync::Arc;

use crate::val::{Exception, Signal, Val};
use crate::vm::context::VmContext;
use crate::vm::error::{Failure, Fault};
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::{BlockKind, Frame};

use super::super::dispatch::{Flow, guest};
use super::target_of;

pub(crate) fn handle_setup_except(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let target = target_of(instr)?;
    frame.blocks.push_block(BlockKind::ExceptHandler, target, frame.stack.len());
    Ok(Flow::Continue)
}

pub(crate) fn handle_setup_finally(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let target = target_of(instr)?;
    frame.blocks.push_block(BlockKind::Finally, target, frame.stack.len());
    Ok(Flow::Continue)
}

/// Resume whatever unwind entered the cleanup code.
///
/// Top of stack is `None` (normal entry), an exception type with value and
/// traceback beneath it, or a return/break signal.
pub(crate) fn handle_end_finally(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    match frame.stack.pop()? {
        Val::None => Ok(Flow::Continue),
        Val::Signal(Signal::Break) => Ok(Flow::Break),
        Val::Signal(Signal::Return) => Ok(Flow::Return(frame.stack.pop()?)),
        Val::ExcType(_) => {
            let value = frame.stack.pop()?;
            let traceback = frame.stack.pop()?;
            let Val::Exception(exception) = value else {
                return Err(Fault::malformed("END_FINALLY: exception descriptor without an exception value"));
            };
            let traceback = match traceback {
                Val::Traceback(tb) => tb.to_vec(),
                _ => Vec::new(),
            };
            Ok(Flow::Raise(Failure { exception, traceback }))
        }
        other => Err(Fault::malformed(format!(
            "END_FINALLY: unexpected '{}' on top of the stack",
            other.type_name()
        ))),
    }
}

fn to_exception(value: Val) -> Result<Arc<Exception>, Exception> {
    match value {
        Val::ExcType(kind) => Ok(Arc::new(Exception::bare(kind))),
        Val::Exception(exc) => Ok(exc),
        other => Err(Exception::type_error(format!(
            "exceptions must derive from Exception, not '{}'",
            other.type_name()
        ))),
    }
}

/// `1`: raise TOS. `2`: TOS is the cause, TOS1 the exception.
pub(crate) fn handle_raise_varargs(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    match instr.arg() {
        1 => {
            let value = frame.stack.pop()?;
            Ok(Flow::raise(guest!(to_exception(value))))
        }
        2 => {
            let cause = frame.stack.pop()?;
            let value = frame.stack.pop()?;
            let exception = guest!(to_exception(value));
            if matches!(cause, Val::None) {
                return Ok(Flow::raise(exception));
            }
            let cause = guest!(to_exception(cause));
            Ok(Flow::raise((*exception).clone().with_cause(cause)))
        }
        n => Err(Fault::malformed(format!(
            "RAISE_VARARGS {n}: re-raise without an active exception is not supported"
        ))),
    }
}
