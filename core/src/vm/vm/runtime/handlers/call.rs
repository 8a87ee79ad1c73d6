use std::sync::Arc;

use crate::val::{ExcType, Exception, FunctionValue, Val};
use crate::vm::context::VmContext;
use crate::vm::error::Fault;
use crate::vm::opcode::Instruction;
use crate::vm::vm::frame::Frame;

use super::super::dispatch::{Flow, guest};

/// Stack: `[callable, arg0, .., argN-1]`. Guest functions come back as
/// [`Flow::Call`]; everything else completes here.
pub(crate) fn handle_call_function(frame: &mut Frame, ctx: &mut VmContext, instr: &Instruction) -> Result<Flow, Fault> {
    let args = frame.stack.pop_n(instr.arg())?;
    let callable = frame.stack.pop()?;
    let result = match callable {
        Val::Function(func) => {
            let callee = guest!(Frame::for_call(&func, args, frame.depth + 1));
            return Ok(Flow::Call(Box::new(callee)));
        }
        Val::Native(native) => match (native.func)(&args, ctx) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(target: "stackvm::vm::call", native = native.name, error = %err, "native call failed");
                return Ok(Flow::raise(native_error(err)));
            }
        },
        Val::ExcType(kind) => match args.first() {
            Some(Val::Str(msg)) => Val::Exception(Arc::new(Exception::new(kind, msg.clone()))),
            Some(other) => Val::Exception(Arc::new(Exception::new(kind, other.to_string()))),
            None => Val::Exception(Arc::new(Exception::bare(kind))),
        },
        other => {
            return Ok(Flow::raise(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))));
        }
    };
    frame.stack.push(result);
    Ok(Flow::Continue)
}

/// Recover a guest exception from a native's error, or wrap the error text.
fn native_error(err: anyhow::Error) -> Exception {
    match err.downcast::<Exception>() {
        Ok(exc) => exc,
        Err(other) => Exception::new(ExcType::RuntimeError, format!("{other:#}")),
    }
}

/// Stack: `[code, name]`. Captures a snapshot of the defining frame's bindings.
pub(crate) fn handle_make_function(frame: &mut Frame, _ctx: &mut VmContext, _instr: &Instruction) -> Result<Flow, Fault> {
    let name = frame.stack.pop()?;
    let code = frame.stack.pop()?;
    let (Val::Code(code), Val::Str(name)) = (code, name) else {
        return Err(Fault::malformed("MAKE_FUNCTION expects a code object and a name string"));
    };
    let function = FunctionValue {
        name,
        code,
        enclosing: frame.capture_scope(),
    };
    frame.stack.push(Val::Function(Arc::new(function)));
    Ok(Flow::Continue)
}
