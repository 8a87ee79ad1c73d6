use crate::op::{BinOp, CompareOp, UnaryOp};
use crate::val::Val;
use crate::vm::context::VmContext;
use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::Frame;

use super::super::dispatch::{Flow, guest};

#[inline]
fn binary(frame: &mut Frame, op: BinOp) -> Result<Flow, Fault> {
    let r = frame.stack.pop()?;
    let l = frame.stack.pop()?;
    let out = guest!(op.eval_vals(&l, &r));
    frame.stack.push(out);
    Ok(Flow::Continue)
}

#[inline]
fn unary(frame: &mut Frame, op: UnaryOp) -> Result<Flow, Fault> {
    let v = frame.stack.pop()?;
    let out = guest!(op.eval_val(&v));
    frame.stack.push(out);
    Ok(Flow::Continue)
}

pub(crate) fn handle_unary_negative(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    unary(frame, UnaryOp::Neg)
}

pub(crate) fn handle_unary_not(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    unary(frame, UnaryOp::Not)
}

pub(crate) fn handle_add(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::Add)
}

pub(crate) fn handle_subtract(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::Sub)
}

pub(crate) fn handle_multiply(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::Mul)
}

pub(crate) fn handle_true_divide(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::TrueDiv)
}

pub(crate) fn handle_floor_divide(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::FloorDiv)
}

pub(crate) fn handle_modulo(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::Mod)
}

pub(crate) fn handle_subscr(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    binary(frame, BinOp::Subscr)
}

pub(crate) fn handle_compare_op(frame: &mut Frame, _ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let arg = instr.arg();
    let op = u8::try_from(arg)
        .ok()
        .and_then(CompareOp::from_u8)
        .ok_or_else(|| Fault::malformed(format!("unknown comparison {arg}")))?;
    let r = frame.stack.pop()?;
    let l = frame.stack.pop()?;
    let out = guest!(op.eval_vals(&l, &r));
    frame.stack.push(Val::Bool(out));
    Ok(Flow::Continue)
}
