use crate::val::{Exception, Val};
use crate::vm::context::VmContext;
use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::{BlockKind, Frame};

use super::super::dispatch::{Flow, guest};
use super::target_of;

pub(crate) fn handle_jump(_frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    Ok(Flow::JumpTo(target_of(instr)?))
}

pub(crate) fn handle_pop_jump_if_false(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let target = target_of(instr)?;
    if frame.stack.pop()?.is_truthy() {
        Ok(Flow::Continue)
    } else {
        Ok(Flow::JumpTo(target))
    }
}

pub(crate) fn handle_setup_loop(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let target = target_of(instr)?;
    frame.blocks.push_block(BlockKind::Loop, target, frame.stack.len());
    Ok(Flow::Continue)
}

pub(crate) fn handle_break_loop(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    if !frame.blocks.has_loop() {
        return Err(Fault::BreakOutsideLoop);
    }
    Ok(Flow::Break)
}

pub(crate) fn handle_pop_block(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    frame.blocks.pop_block()?;
    Ok(Flow::Continue)
}

pub(crate) fn handle_get_iter(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    let iterable = frame.stack.pop()?;
    let iter = guest!(iterable.iter());
    frame.stack.push(Val::Iterator(iter));
    Ok(Flow::Continue)
}

/// Push the next element, or pop the exhausted iterator and jump past the loop body.
pub(crate) fn handle_for_iter(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let target = target_of(instr)?;
    let next = match frame.stack.peek()? {
        Val::Iterator(it) => it.next(),
        other => {
            return Ok(Flow::raise(Exception::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            ))));
        }
    };
    match next {
        Some(value) => {
            frame.stack.push(value);
            Ok(Flow::Continue)
        }
        None => {
            frame.stack.pop()?;
            Ok(Flow::JumpTo(target))
        }
    }
}

pub(crate) fn handle_return_value(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    Ok(Flow::Return(frame.stack.pop()?))
}
