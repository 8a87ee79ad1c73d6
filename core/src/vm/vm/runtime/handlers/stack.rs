use crate::val::Val;
use crate::vm::context::VmContext;
use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::Frame;

use super::super::dispatch::Flow;

pub(crate) fn handle_nop(_frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    Ok(Flow::Continue)
}

pub(crate) fn handle_pop_top(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    frame.stack.pop()?;
    Ok(Flow::Continue)
}

pub(crate) fn handle_rot_two(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    let mut top = frame.stack.pop_n(2)?;
    top.swap(0, 1);
    frame.stack.push_all(top);
    Ok(Flow::Continue)
}

/// `[a, b, c] -> [c, a, b]`: the top sinks to third place.
pub(crate) fn handle_rot_three(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    let mut top = frame.stack.pop_n(3)?;
    top.rotate_right(1);
    frame.stack.push_all(top);
    Ok(Flow::Continue)
}

pub(crate) fn handle_dup_top(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    let top = frame.stack.peek()?.clone();
    frame.stack.push(top);
    Ok(Flow::Continue)
}

pub(crate) fn handle_load_const(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let idx = instr.arg();
    let value = frame.code.consts.get(idx).map(Val::from).ok_or_else(|| {
        Fault::malformed(format!(
            "index {idx} out of range for consts ({} entries)",
            frame.code.consts.len()
        ))
    })?;
    frame.stack.push(value);
    Ok(Flow::Continue)
}

pub(crate) fn handle_build_list(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let items = frame.stack.pop_n(instr.arg())?;
    frame.stack.push(Val::list(items));
    Ok(Flow::Continue)
}

pub(crate) fn handle_build_tuple(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let items = frame.stack.pop_n(instr.arg())?;
    frame.stack.push(Val::tuple(items));
    Ok(Flow::Continue)
}
