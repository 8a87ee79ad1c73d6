use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Result, anyhow, ensure};

use super::decode::Decoder;
use super::opcode::{Opcode, OperandClass};

/// Literal stored in a unit's constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Vec<Constant>),
    Code(Arc<CodeUnit>),
}

/// An immutable compiled unit: instruction bytes plus the tables its operands index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeUnit {
    pub name: Arc<str>,
    /// Number of leading `varnames` that are positional parameters.
    pub argcount: usize,
    pub code: Vec<u8>,
    pub consts: Vec<Constant>,
    /// Targets of `*_NAME` and `*_GLOBAL` operands.
    pub names: Vec<Arc<str>>,
    /// Slot-addressed locals, parameters first.
    pub varnames: Vec<Arc<str>>,
    /// Variables resolved through the enclosing scope chain (`LOAD_DEREF`).
    pub freevars: Vec<Arc<str>>,
}

impl CodeUnit {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Statically check the instruction stream against the tables.
    ///
    /// Every opcode must decode, every index must be in range and every jump
    /// must land on an instruction boundary (or the end of the stream). Nested
    /// code constants are checked too.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.argcount <= self.varnames.len(),
            "unit '{}': argcount {} exceeds {} varnames",
            self.name,
            self.argcount,
            self.varnames.len()
        );

        let mut boundaries = vec![false; self.code.len() + 1];
        let mut jumps = Vec::new();
        for decoded in Decoder::new(&self.code) {
            let instr = decoded.map_err(|fault| anyhow!("unit '{}': {}", self.name, fault))?;
            boundaries[instr.offset] = true;
            let table_len = match instr.opcode {
                Opcode::LoadConst => Some(("consts", self.consts.len())),
                Opcode::LoadName
                | Opcode::StoreName
                | Opcode::DeleteName
                | Opcode::LoadGlobal
                | Opcode::StoreGlobal => Some(("names", self.names.len())),
                Opcode::LoadFast | Opcode::StoreFast => Some(("varnames", self.varnames.len())),
                Opcode::LoadDeref => Some(("freevars", self.freevars.len())),
                _ => None,
            };
            if let Some((table, len)) = table_len {
                ensure!(
                    instr.arg() < len,
                    "unit '{}': {} at offset {} indexes {}[{}] but the table has {} entries",
                    self.name,
                    instr.opcode,
                    instr.offset,
                    table,
                    instr.arg(),
                    len
                );
            }
            if instr.opcode == Opcode::RaiseVarargs {
                ensure!(
                    (1..=2).contains(&instr.arg()),
                    "unit '{}': RAISE_VARARGS {} at offset {} is not supported",
                    self.name,
                    instr.arg(),
                    instr.offset
                );
            }
            if let Some(target) = instr.target() {
                jumps.push((instr.offset, target));
            }
        }
        boundaries[self.code.len()] = true;

        for (offset, target) in jumps {
            ensure!(
                boundaries.get(target).copied().unwrap_or(false),
                "unit '{}': jump at offset {} targets {} which is not an instruction boundary",
                self.name,
                offset,
                target
            );
        }

        for constant in &self.consts {
            validate_constant(constant)?;
        }
        Ok(())
    }

    /// Human-readable listing, one instruction per line, nested units appended.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "code '{}' (argcount={}, {} bytes)",
            self.name,
            self.argcount,
            self.code.len()
        );
        for decoded in Decoder::new(&self.code) {
            match decoded {
                Ok(instr) => {
                    let _ = write!(out, "{instr}");
                    if instr.opcode.class() == OperandClass::Wide
                        && let Some(note) = self.operand_note(instr.opcode, instr.arg())
                    {
                        let _ = write!(out, " ({note})");
                    }
                    out.push('\n');
                }
                Err(fault) => {
                    let _ = writeln!(out, "  <{fault}>");
                }
            }
        }
        for constant in &self.consts {
            if let Constant::Code(nested) = constant {
                out.push('\n');
                nested.disassemble_into(out);
            }
        }
    }

    fn operand_note(&self, opcode: Opcode, arg: usize) -> Option<String> {
        let name = match opcode {
            Opcode::LoadConst => return self.consts.get(arg).map(describe_constant),
            Opcode::LoadName
            | Opcode::StoreName
            | Opcode::DeleteName
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal => self.names.get(arg),
            Opcode::LoadFast | Opcode::StoreFast => self.varnames.get(arg),
            Opcode::LoadDeref => self.freevars.get(arg),
            _ => None,
        };
        name.map(|n| n.to_string())
    }
}

fn validate_constant(constant: &Constant) -> Result<()> {
    match constant {
        Constant::Code(unit) => unit.validate(),
        Constant::Tuple(items) => items.iter().try_for_each(validate_constant),
        _ => Ok(()),
    }
}

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Float(f) => f.to_string(),
        Constant::Str(s) => format!("{s:?}"),
        Constant::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(describe_constant).collect();
            format!("({})", inner.join(", "))
        }
        Constant::Code(unit) => format!("<code {}>", unit.name),
    }
}
