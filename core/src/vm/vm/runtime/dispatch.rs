//! Opcode -> handler mapping and the control-flow value handlers return.

use std::sync::Arc;

use crate::val::{Exception, Val};
use crate::vm::context::VmContext;
use crate::vm::error::{Failure, Fault};
use crate::vm::opcode::{Instruction, Opcode};
use crate::vm::vm::frame::Frame;

use super::handlers::{arith, call, control, except, names, stack};

/// What the run loop should do after an instruction.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    /// Absolute target; `0` is a valid offset.
    JumpTo(usize),
    Return(Val),
    Raise(Failure),
    Break,
    Call(Box<Frame>),
}

impl Flow {
    pub(crate) fn raise(exception: impl Into<Arc<Exception>>) -> Self {
        Flow::Raise(Failure::new(exception))
    }
}

/// Signature shared by every opcode handler.
///
/// `Err` is reserved for fatal faults; guest exceptions travel as [`Flow::Raise`].
pub(crate) type Handler = fn(&mut Frame, &mut VmContext, &Instruction) -> Result<Flow, Fault>;

/// Unwrap a guest-level result, turning `Err(Exception)` into `Flow::Raise`.
macro_rules! guest {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(exc) => return Ok($crate::vm::vm::runtime::dispatch::Flow::raise(exc)),
        }
    };
}
pub(crate) use guest;

pub(crate) fn handler_for(op: Opcode) -> Handler {
    match op {
        Opcode::PopTop => stack::handle_pop_top,
        Opcode::RotTwo => stack::handle_rot_two,
        Opcode::RotThree => stack::handle_rot_three,
        Opcode::DupTop => stack::handle_dup_top,
        Opcode::Nop => stack::handle_nop,
        Opcode::BuildList => stack::handle_build_list,
        Opcode::BuildTuple => stack::handle_build_tuple,
        Opcode::LoadConst => stack::handle_load_const,

        Opcode::UnaryNegative => arith::handle_unary_negative,
        Opcode::UnaryNot => arith::handle_unary_not,
        Opcode::BinaryAdd | Opcode::InplaceAdd => arith::handle_add,
        Opcode::BinarySubtract | Opcode::InplaceSubtract => arith::handle_subtract,
        Opcode::BinaryMultiply | Opcode::InplaceMultiply => arith::handle_multiply,
        Opcode::BinaryTrueDivide => arith::handle_true_divide,
        Opcode::BinaryFloorDivide => arith::handle_floor_divide,
        Opcode::BinaryModulo => arith::handle_modulo,
        Opcode::BinarySubscr => arith::handle_subscr,
        Opcode::CompareOp => arith::handle_compare_op,

        Opcode::LoadName => names::handle_load_name,
        Opcode::StoreName => names::handle_store_name,
        Opcode::DeleteName => names::handle_delete_name,
        Opcode::LoadFast => names::handle_load_fast,
        Opcode::StoreFast => names::handle_store_fast,
        Opcode::LoadGlobal => names::handle_load_global,
        Opcode::StoreGlobal => names::handle_store_global,
        Opcode::LoadDeref => names::handle_load_deref,

        Opcode::JumpAbsolute | Opcode::JumpForward => control::handle_jump,
        Opcode::PopJumpIfFalse => control::handle_pop_jump_if_false,
        Opcode::SetupLoop => control::handle_setup_loop,
        Opcode::BreakLoop => control::handle_break_loop,
        Opcode::PopBlock => control::handle_pop_block,
        Opcode::GetIter => control::handle_get_iter,
        Opcode::ForIter => control::handle_for_iter,
        Opcode::ReturnValue => control::handle_return_value,

        Opcode::CallFunction => call::handle_call_function,
        Opcode::MakeFunction => call::handle_make_function,

        Opcode::SetupExcept => except::handle_setup_except,
        Opcode::SetupFinally => except::handle_setup_finally,
        Opcode::EndFinally => except::handle_end_finally,
        Opcode::RaiseVarargs => except::handle_raise_varargs,
    }
}
