use std::sync::Arc;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{ExcType, Exception, FunctionValue, Scope, Val};
use crate::vm::code::CodeUnit;
use crate::vm::error::{Fault, Location};
use crate::vm::opcode::Opcode;

/// Per-frame operand stack.
///
/// Pops never invent a placeholder: an empty stack is a [`Fault::StackUnderflow`].
#[derive(Debug, Default)]
pub struct OperandStack {
    values: Vec<Val>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, value: Val) {
        self.values.push(value);
    }

    pub fn push_all(&mut self, values: impl IntoIterator<Item = Val>) {
        self.values.extend(values);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Val, Fault> {
        self.values.pop().ok_or(Fault::StackUnderflow("pop from empty operand stack"))
    }

    /// Remove the top `k` values, returned in push order. On underflow the
    /// stack is left untouched.
    pub fn pop_n(&mut self, k: usize) -> Result<Vec<Val>, Fault> {
        if k > self.values.len() {
            return Err(Fault::StackUnderflow("pop_n past the bottom of the operand stack"));
        }
        let at = self.values.len() - k;
        Ok(self.values.split_off(at))
    }

    #[inline]
    pub fn peek(&self) -> Result<&Val, Fault> {
        self.peek_at(0)
    }

    /// `n = 0` is the top of the stack.
    pub fn peek_at(&self, n: usize) -> Result<&Val, Fault> {
        self.values
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.values.get(i))
            .ok_or(Fault::StackUnderflow("peek past the bottom of the operand stack"))
    }

    /// Shrink to `depth`; a larger `depth` is a no-op.
    pub fn truncate(&mut self, depth: usize) {
        self.values.truncate(depth);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Loop,
    ExceptHandler,
    Finally,
}

/// Structured-control marker: where to go and what stack depth to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub target: usize,
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct BlockStack {
    blocks: Vec<Block>,
}

impl BlockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&mut self, kind: BlockKind, target: usize, depth: usize) {
        self.blocks.push(Block { kind, target, depth });
    }

    pub fn pop_block(&mut self) -> Result<Block, Fault> {
        self.blocks.pop().ok_or(Fault::StackUnderflow("pop from empty block stack"))
    }

    pub(crate) fn take_innermost(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    pub fn innermost(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn has_loop(&self) -> bool {
        self.blocks.iter().any(|b| b.kind == BlockKind::Loop)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Where `*_NAME` opcodes read and write.
#[derive(Debug)]
pub(crate) enum NameScope {
    /// Module-level code: names are the globals.
    Globals,
    Local(FastHashMap<Arc<str>, Val>),
}

/// One activation record.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) code: Arc<CodeUnit>,
    pub(crate) ip: usize,
    /// Offset and opcode of the instruction being executed, for locations.
    pub(crate) current: usize,
    pub(crate) current_op: Option<Opcode>,
    pub(crate) stack: OperandStack,
    pub(crate) blocks: BlockStack,
    pub(crate) slots: Vec<Option<Val>>,
    pub(crate) names: NameScope,
    pub(crate) enclosing: Option<Arc<Scope>>,
    pub(crate) depth: usize,
}

impl Frame {
    pub(crate) fn new(code: Arc<CodeUnit>, names: NameScope, enclosing: Option<Arc<Scope>>, depth: usize) -> Self {
        let slots = vec![None; code.varnames.len()];
        Self {
            code,
            ip: 0,
            current: 0,
            current_op: None,
            stack: OperandStack::with_capacity(8),
            blocks: BlockStack::new(),
            slots,
            names,
            enclosing,
            depth,
        }
    }

    /// Frame for calling `func`, with `args` bound to the parameter slots.
    pub(crate) fn for_call(func: &FunctionValue, args: Vec<Val>, depth: usize) -> Result<Self, Exception> {
        let expected = func.code.argcount;
        if args.len() != expected {
            return Err(Exception::new(
                ExcType::TypeError,
                format!(
                    "{}() takes {} positional argument{} but {} {} given",
                    func.name,
                    expected,
                    if expected == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" }
                ),
            ));
        }
        let mut frame = Frame::new(
            func.code.clone(),
            NameScope::Local(fast_hash_map_new()),
            func.enclosing.clone(),
            depth,
        );
        for (slot, arg) in frame.slots.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        Ok(frame)
    }

    pub(crate) fn location(&self) -> Location {
        Location::new(self.code.name.clone(), self.current, self.current_op)
    }

    pub(crate) fn name(&self, idx: usize) -> Result<Arc<str>, Fault> {
        table_entry(&self.code.names, idx, "names")
    }

    pub(crate) fn varname(&self, idx: usize) -> Result<Arc<str>, Fault> {
        table_entry(&self.code.varnames, idx, "varnames")
    }

    pub(crate) fn freevar(&self, idx: usize) -> Result<Arc<str>, Fault> {
        table_entry(&self.code.freevars, idx, "freevars")
    }

    /// Snapshot of the bindings a function defined in this frame can see.
    pub(crate) fn capture_scope(&self) -> Option<Arc<Scope>> {
        let mut bindings = fast_hash_map_new();
        for (name, slot) in self.code.varnames.iter().zip(&self.slots) {
            if let Some(v) = slot {
                bindings.insert(name.clone(), v.clone());
            }
        }
        if let NameScope::Local(map) = &self.names {
            for (k, v) in map {
                bindings.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        if bindings.is_empty() {
            return self.enclosing.clone();
        }
        Some(Arc::new(Scope {
            bindings,
            parent: self.enclosing.clone(),
        }))
    }
}

fn table_entry(table: &[Arc<str>], idx: usize, what: &str) -> Result<Arc<str>, Fault> {
    table.get(idx).cloned().ok_or_else(|| {
        Fault::malformed(format!(
            "index {idx} out of range for {what} ({} entries)",
            table.len()
        ))
    })
}
