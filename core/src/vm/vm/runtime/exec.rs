use std::sync::Arc;

use crate::util::fast_map::fast_hash_map_new;
use crate::val::{ExcType, Exception, Val};
use crate::vm::code::CodeUnit;
use crate::vm::context::VmContext;
use crate::vm::decode::decode_at;
use crate::vm::error::{Fault, Location, VmError};
use crate::vm::vm::Vm;
use crate::vm::vm::frame::{Frame, NameScope};

use super::dispatch::{Flow, handler_for};
use super::unwind::Unwind;

impl Vm {
    /// Run `code` as module-level code: name stores go to the globals.
    pub fn execute(&mut self, code: &Arc<CodeUnit>, ctx: &mut VmContext) -> Result<Val, VmError> {
        self.execute_with(code, ctx, None)
    }

    /// Run `code` with initial `locals`.
    ///
    /// A local whose name is in `varnames` fills that slot; the rest go to the
    /// frame's own name map, which then also receives `STORE_NAME`s.
    pub fn execute_with(
        &mut self,
        code: &Arc<CodeUnit>,
        ctx: &mut VmContext,
        locals: Option<&[(&str, Val)]>,
    ) -> Result<Val, VmError> {
        let base = self.frames.len();
        let names = match locals {
            None => NameScope::Globals,
            Some(_) => NameScope::Local(fast_hash_map_new()),
        };
        let mut frame = Frame::new(code.clone(), names, None, 0);
        for (name, value) in locals.unwrap_or_default() {
            match code.varnames.iter().position(|v| v.as_ref() == *name) {
                Some(slot) => frame.slots[slot] = Some(value.clone()),
                None => {
                    if let NameScope::Local(map) = &mut frame.names {
                        map.insert(Arc::from(*name), value.clone());
                    }
                }
            }
        }
        tracing::debug!(target: "stackvm::vm::frame", unit = %code.name, "execute");
        self.frames.push(frame);

        let result = self.run(ctx, base);
        debug_assert_eq!(self.frames.len(), base, "run must leave no frames behind");
        result
    }

    /// Drive the top frame until the frame stack returns to `base`.
    fn run(&mut self, ctx: &mut VmContext, base: usize) -> Result<Val, VmError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Val::None);
            };
            let flow = match decode_at(&frame.code.code, frame.ip) {
                Ok(Some(instr)) => {
                    frame.ip = instr.next;
                    frame.current = instr.offset;
                    frame.current_op = Some(instr.opcode);
                    tracing::trace!(
                        target: "stackvm::vm::dispatch",
                        unit = %frame.code.name,
                        offset = instr.offset,
                        op = %instr.opcode,
                        stack = frame.stack.len(),
                        "dispatch"
                    );
                    match handler_for(instr.opcode)(frame, ctx, &instr) {
                        Ok(flow) => flow,
                        Err(fault) => return Err(self.fatal(fault, base)),
                    }
                }
                // Falling off the end is an implicit `return None`.
                Ok(None) => {
                    frame.current = frame.ip;
                    frame.current_op = None;
                    Flow::Return(Val::None)
                }
                Err(fault) => {
                    frame.current = frame.ip;
                    frame.current_op = None;
                    return Err(self.fatal(fault, base));
                }
            };
            if let Some(result) = self.apply(flow, base)? {
                return Ok(result);
            }
        }
    }

    /// Apply a handler's control-flow value. `Some` carries the final result.
    fn apply(&mut self, flow: Flow, base: usize) -> Result<Option<Val>, VmError> {
        match flow {
            Flow::Continue => Ok(None),
            Flow::JumpTo(target) => {
                let Some(frame) = self.frames.last_mut() else {
                    return Ok(None);
                };
                if target > frame.code.code.len() {
                    let fault = Fault::malformed(format!(
                        "jump target {target} outside code of length {}",
                        frame.code.code.len()
                    ));
                    return Err(self.fatal(fault, base));
                }
                frame.ip = target;
                Ok(None)
            }
            Flow::Return(value) => self.unwind(Unwind::Return(value), base),
            Flow::Break => self.unwind(Unwind::Break, base),
            Flow::Raise(mut failure) => {
                if failure.traceback.is_empty()
                    && let Some(frame) = self.frames.last()
                {
                    failure.traceback.push(frame.location());
                }
                self.unwind(Unwind::Raise(failure), base)
            }
            Flow::Call(callee) => {
                if callee.depth >= self.options.max_call_depth {
                    let exc = Exception::new(ExcType::RecursionError, "maximum recursion depth exceeded");
                    return self.apply(Flow::raise(exc), base);
                }
                tracing::debug!(
                    target: "stackvm::vm::frame",
                    unit = %callee.code.name,
                    depth = callee.depth,
                    "push frame"
                );
                self.frames.push(*callee);
                Ok(None)
            }
        }
    }

    /// Convert a fault into a located error and drop every frame of this run.
    fn fatal(&mut self, fault: Fault, base: usize) -> VmError {
        let location = self
            .frames
            .last()
            .map(Frame::location)
            .unwrap_or_else(|| Location::new(Arc::from("<vm>"), 0, None));
        tracing::debug!(target: "stackvm::vm::unwind", %location, %fault, "fatal fault");
        self.frames.truncate(base);
        fault.at(location)
    }
}
