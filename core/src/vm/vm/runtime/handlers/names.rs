use crate::val::{ExcType, Exception};
use crate::vm::context::VmContext;
use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::{Frame, NameScope};

use super::super::dispatch::Flow;

/// Frame names, then the captured scope chain, then globals, then builtins.
pub(crate) fn handle_load_name(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.name(instr.arg())?;
    let local = match &frame.names {
        NameScope::Local(map) => map
            .get(&name)
            .or_else(|| frame.enclosing.as_deref().and_then(|scope| scope.lookup(&name)))
            .cloned(),
        NameScope::Globals => None,
    };
    match local.or_else(|| ctx.lookup(&name).cloned()) {
        Some(value) => {
            frame.stack.push(value);
            Ok(Flow::Continue)
        }
        None => Ok(Flow::raise(Exception::name_error(&name))),
    }
}

pub(crate) fn handle_store_name(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.name(instr.arg())?;
    let value = frame.stack.pop()?;
    match &mut frame.names {
        NameScope::Local(map) => {
            map.insert(name, value);
        }
        NameScope::Globals => ctx.set_global(name, value),
    }
    Ok(Flow::Continue)
}

pub(crate) fn handle_delete_name(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.name(instr.arg())?;
    let removed = match &mut frame.names {
        NameScope::Local(map) => map.remove(&name),
        NameScope::Globals => ctx.remove_global(&name),
    };
    match removed {
        Some(_) => Ok(Flow::Continue),
        None => Ok(Flow::raise(Exception::name_error(&name))),
    }
}

pub(crate) fn handle_load_fast(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let idx = instr.arg();
    let name = frame.varname(idx)?;
    match frame.slots.get(idx).cloned().flatten() {
        Some(value) => {
            frame.stack.push(value);
            Ok(Flow::Continue)
        }
        None => Ok(Flow::raise(Exception::new(
            ExcType::UnboundLocalError,
            format!("local variable '{name}' referenced before assignment"),
        ))),
    }
}

pub(crate) fn handle_store_fast(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let idx = instr.arg();
    let value = frame.stack.pop()?;
    match frame.slots.get_mut(idx) {
        Some(slot) => {
            *slot = Some(value);
            Ok(Flow::Continue)
        }
        None => Err(Fault::malformed(format!(
            "index {idx} out of range for varnames ({} entries)",
            frame.slots.len()
        ))),
    }
}

pub(crate) fn handle_load_global(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.name(instr.arg())?;
    match ctx.lookup(&name) {
        Some(value) => {
            frame.stack.push(value.clone());
            Ok(Flow::Continue)
        }
        None => Ok(Flow::raise(Exception::name_error(&name))),
    }
}

pub(crate) fn handle_store_global(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.name(instr.arg())?;
    let value = frame.stack.pop()?;
    ctx.set_global(name, value);
    Ok(Flow::Continue)
}

pub(crate) fn handle_load_deref(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.freevar(instr.arg())?;
    match frame.enclosing.as_deref().and_then(|scope| scope.lookup(&name)) {
        Some(value) => {
            let value = value.clone();
            frame.stack.push(value);
            Ok(Flow::Continue)
        }
        None => Ok(Flow::raise(Exception::new(
            ExcType::NameError,
            format!("free variable '{name}' referenced before assignment in enclosing scope"),
        ))),
    }
}
