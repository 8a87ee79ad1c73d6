//! Block-stack unwinding for `return`, `break` and raised exceptions.

use std::sync::Arc;

use crate::val::{Signal, Val};
use crate::vm::error::{Failure, Fault, VmError};
use crate::vm::vm::Vm;
use crate::vm::vm::frame::{BlockKind, Frame};

/// Why the current frame is unwinding.
#[derive(Debug)]
pub(super) enum Unwind {
    Return(Val),
    Break,
    Raise(Failure),
}

impl Unwind {
    fn label(&self) -> &'static str {
        match self {
            Unwind::Return(_) => "return",
            Unwind::Break => "break",
            Unwind::Raise(_) => "raise",
        }
    }
}

/// Push the `[traceback, value, type]` triple for a handler, type on top.
fn push_exception(frame: &mut Frame, failure: &Failure) {
    let traceback: Arc<[_]> = failure.traceback.clone().into();
    frame.stack.push(Val::Traceback(traceback));
    frame.stack.push(Val::Exception(failure.exception.clone()));
    frame.stack.push(Val::ExcType(failure.exception.kind));
}

impl Vm {
    /// Pop blocks until one takes over control, popping frames as they run
    /// out of blocks. `Ok(Some(v))` means the outermost frame returned `v`.
    pub(super) fn unwind(&mut self, mut reason: Unwind, base: usize) -> Result<Option<Val>, VmError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };

            while let Some(block) = frame.blocks.take_innermost() {
                let resumes = match (block.kind, &reason) {
                    (BlockKind::Loop, Unwind::Break) => true,
                    (BlockKind::ExceptHandler, Unwind::Raise(_)) => true,
                    (BlockKind::Finally, _) => true,
                    _ => false,
                };
                if !resumes {
                    continue;
                }
                tracing::debug!(
                    target: "stackvm::vm::unwind",
                    unit = %frame.code.name,
                    reason = reason.label(),
                    block = ?block.kind,
                    target = block.target,
                    "resume at block"
                );
                frame.stack.truncate(block.depth);
                match (block.kind, reason) {
                    (BlockKind::Loop, _) => {}
                    (_, Unwind::Raise(failure)) => push_exception(frame, &failure),
                    (_, Unwind::Return(value)) => {
                        frame.stack.push(value);
                        frame.stack.push(Val::Signal(Signal::Return));
                    }
                    (_, Unwind::Break) => frame.stack.push(Val::Signal(Signal::Break)),
                }
                frame.ip = block.target;
                return Ok(None);
            }

            // No block claimed it: the frame is done.
            match reason {
                Unwind::Break => {
                    let location = frame.location();
                    self.frames.truncate(base);
                    return Err(Fault::BreakOutsideLoop.at(location));
                }
                Unwind::Return(value) => {
                    self.pop_frame("return");
                    if self.frames.len() == base {
                        return Ok(Some(value));
                    }
                    if let Some(caller) = self.frames.last_mut() {
                        caller.stack.push(value);
                    }
                    return Ok(None);
                }
                Unwind::Raise(mut failure) => {
                    self.pop_frame("raise");
                    if self.frames.len() == base {
                        tracing::debug!(
                            target: "stackvm::vm::unwind",
                            exception = %failure.exception,
                            "unhandled exception escapes the run"
                        );
                        return Err(VmError::Raised { failure });
                    }
                    if let Some(caller) = self.frames.last() {
                        failure.traceback.push(caller.location());
                    }
                    reason = Unwind::Raise(failure);
                }
            }
        }
    }

    fn pop_frame(&mut self, why: &'static str) {
        if let Some(frame) = self.frames.pop() {
            tracing::debug!(
                target: "stackvm::vm::frame",
                unit = %frame.code.name,
                depth = frame.depth,
                why,
                "pop frame"
            );
        }
    }
}
