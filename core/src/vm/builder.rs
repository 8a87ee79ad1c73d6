use std::sync::Arc;

use anyhow::{Result, bail, ensure};

use crate::op::CompareOp;

use super::code::{CodeUnit, Constant};
use super::opcode::{Opcode, OperandClass};

/// Forward-referenceable position in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
    /// Offset of the two operand bytes.
    at: usize,
    /// Offset of the following instruction (base for relative jumps).
    next: usize,
    class: OperandClass,
    label: Label,
}

/// Incremental assembler for [`CodeUnit`]s.
///
/// Emission never fails on the spot; problems (wrong operand class, label
/// bound twice, table overflow) are collected and reported by [`finish`].
///
/// [`finish`]: CodeBuilder::finish
#[derive(Debug)]
pub struct CodeBuilder {
    name: Arc<str>,
    argcount: usize,
    code: Vec<u8>,
    consts: Vec<Constant>,
    names: Vec<Arc<str>>,
    varnames: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    errors: Vec<String>,
}

impl CodeBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            argcount: 0,
            code: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Declare positional parameters; they occupy the first local slots.
    pub fn with_params(mut self, params: &[&str]) -> Self {
        for p in params {
            self.varname_index(p);
        }
        self.argcount = params.len();
        self
    }

    /// Pre-seed the constant pool so that explicit indices stay stable.
    pub fn with_consts(mut self, consts: Vec<Constant>) -> Self {
        self.consts = consts;
        self
    }

    /// Current end of the instruction stream.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> &mut Self {
        let here = self.code.len();
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => *slot = Some(here),
            Some(Some(_)) => self.errors.push(format!("label {} bound twice", label.0)),
            None => self.errors.push(format!("label {} does not belong to this builder", label.0)),
        }
        self
    }

    /// Emit an operand-less opcode.
    pub fn emit(&mut self, op: Opcode) -> &mut Self {
        if op.class() != OperandClass::None {
            self.errors
                .push(format!("{op} at offset {} requires an operand", self.code.len()));
        }
        self.code.push(op as u8);
        self
    }

    /// Emit a byte- or wide-operand opcode with a raw argument.
    pub fn emit_arg(&mut self, op: Opcode, arg: usize) -> &mut Self {
        let offset = self.code.len();
        self.code.push(op as u8);
        match op.class() {
            OperandClass::Byte => match u8::try_from(arg) {
                Ok(b) => self.code.push(b),
                Err(_) => {
                    self.errors.push(format!("{op} at offset {offset}: argument {arg} exceeds 255"));
                    self.code.push(0);
                }
            },
            OperandClass::Wide => match u16::try_from(arg) {
                Ok(w) => self.code.extend_from_slice(&w.to_le_bytes()),
                Err(_) => {
                    self.errors
                        .push(format!("{op} at offset {offset}: argument {arg} exceeds 65535"));
                    self.code.extend_from_slice(&[0, 0]);
                }
            },
            other => {
                self.errors
                    .push(format!("{op} at offset {offset} takes a {other:?} operand, not an index"));
                self.code.extend(std::iter::repeat_n(0, other.width()));
            }
        }
        self
    }

    /// Emit a jump-class opcode to `label`, patched in [`finish`](Self::finish).
    pub fn emit_jump(&mut self, op: Opcode, label: Label) -> &mut Self {
        let offset = self.code.len();
        let class = op.class();
        if !class.is_jump() {
            self.errors.push(format!("{op} at offset {offset} is not a jump"));
        }
        self.code.push(op as u8);
        let at = self.code.len();
        self.code.extend(std::iter::repeat_n(0, class.width()));
        if class.is_jump() {
            self.fixups.push(Fixup {
                at,
                next: self.code.len(),
                class,
                label,
            });
        }
        self
    }

    pub fn const_index(&mut self, constant: Constant) -> usize {
        if let Some(i) = self.consts.iter().position(|c| same_constant(c, &constant)) {
            return i;
        }
        self.consts.push(constant);
        self.consts.len() - 1
    }

    pub fn name_index(&mut self, name: &str) -> usize {
        intern(&mut self.names, name)
    }

    pub fn varname_index(&mut self, name: &str) -> usize {
        intern(&mut self.varnames, name)
    }

    pub fn freevar_index(&mut self, name: &str) -> usize {
        intern(&mut self.freevars, name)
    }

    pub fn load_const(&mut self, constant: Constant) -> &mut Self {
        let idx = self.const_index(constant);
        self.emit_arg(Opcode::LoadConst, idx)
    }

    pub fn load_none(&mut self) -> &mut Self {
        self.load_const(Constant::None)
    }

    pub fn load_int(&mut self, value: i64) -> &mut Self {
        self.load_const(Constant::Int(value))
    }

    pub fn load_str(&mut self, value: &str) -> &mut Self {
        self.load_const(Constant::Str(Arc::from(value)))
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::LoadName, idx)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::StoreName, idx)
    }

    pub fn delete_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::DeleteName, idx)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::LoadGlobal, idx)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::StoreGlobal, idx)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.varname_index(name);
        self.emit_arg(Opcode::LoadFast, idx)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.varname_index(name);
        self.emit_arg(Opcode::StoreFast, idx)
    }

    pub fn load_deref(&mut self, name: &str) -> &mut Self {
        let idx = self.freevar_index(name);
        self.emit_arg(Opcode::LoadDeref, idx)
    }

    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit_arg(Opcode::CompareOp, op as usize)
    }

    pub fn call(&mut self, argc: usize) -> &mut Self {
        self.emit_arg(Opcode::CallFunction, argc)
    }

    pub fn raise(&mut self, argc: usize) -> &mut Self {
        self.emit_arg(Opcode::RaiseVarargs, argc)
    }

    pub fn build_list(&mut self, n: usize) -> &mut Self {
        self.emit_arg(Opcode::BuildList, n)
    }

    pub fn build_tuple(&mut self, n: usize) -> &mut Self {
        self.emit_arg(Opcode::BuildTuple, n)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Opcode::ReturnValue)
    }

    /// Push a function object for `unit` under `name`.
    pub fn make_function(&mut self, unit: CodeUnit, name: &str) -> &mut Self {
        self.load_const(Constant::Code(Arc::new(unit)));
        self.load_str(name);
        self.emit(Opcode::MakeFunction)
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::JumpAbsolute, label)
    }

    pub fn jump_forward(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::JumpForward, label)
    }

    pub fn pop_jump_if_false(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::PopJumpIfFalse, label)
    }

    pub fn setup_loop(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::SetupLoop, label)
    }

    pub fn setup_except(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::SetupExcept, label)
    }

    pub fn setup_finally(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::SetupFinally, label)
    }

    pub fn for_iter(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Opcode::ForIter, label)
    }

    /// Patch jumps, check every label is bound and validate the result.
    pub fn finish(mut self) -> Result<CodeUnit> {
        if let Some(first) = self.errors.first() {
            bail!("code unit '{}': {} ({} problem(s) total)", self.name, first, self.errors.len());
        }
        for fixup in &self.fixups {
            let Some(Some(target)) = self.labels.get(fixup.label.0).copied() else {
                bail!("code unit '{}': label {} is never bound", self.name, fixup.label.0);
            };
            let raw = match fixup.class {
                OperandClass::Relative => {
                    ensure!(
                        target >= fixup.next,
                        "code unit '{}': relative jump at offset {} cannot reach earlier offset {}",
                        self.name,
                        fixup.at - 1,
                        target
                    );
                    target - fixup.next
                }
                _ => target,
            };
            let Ok(raw) = u16::try_from(raw) else {
                bail!("code unit '{}': jump operand {} exceeds 65535", self.name, raw);
            };
            self.code[fixup.at..fixup.at + 2].copy_from_slice(&raw.to_le_bytes());
        }
        for (table, len) in [
            ("consts", self.consts.len()),
            ("names", self.names.len()),
            ("varnames", self.varnames.len()),
            ("freevars", self.freevars.len()),
        ] {
            ensure!(
                len <= u16::MAX as usize + 1,
                "code unit '{}': {} table has {} entries",
                self.name,
                table,
                len
            );
        }

        let unit = CodeUnit {
            name: self.name,
            argcount: self.argcount,
            code: self.code,
            consts: self.consts,
            names: self.names,
            varnames: self.varnames,
            freevars: self.freevars,
        };
        unit.validate()?;
        Ok(unit)
    }
}

fn intern(table: &mut Vec<Arc<str>>, name: &str) -> usize {
    if let Some(i) = table.iter().position(|n| n.as_ref() == name) {
        return i;
    }
    table.push(Arc::from(name));
    table.len() - 1
}

/// Interning equality: `1`, `1.0` and `True` stay distinct, and NaN matches itself.
fn same_constant(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        (Constant::Tuple(xs), Constant::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_constant(x, y))
        }
        (Constant::Code(x), Constant::Code(y)) => Arc::ptr_eq(x, y),
        _ => a == b,
    }
}
