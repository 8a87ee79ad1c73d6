//! JSON assembly format for code units.
//!
//! ```json
//! {
//!   "name": "<module>",
//!   "consts": [1, 2],
//!   "code": [
//!     {"op": "LOAD_CONST", "arg": 0},
//!     {"op": "STORE_NAME", "arg": "x"},
//!     {"op": "JUMP_FORWARD", "target": "end"},
//!     {"label": "end"}
//!   ]
//! }
//! ```
//!
//! A string `arg` on a table opcode is interned into the matching table, a
//! number is taken as a raw index. `COMPARE_OP` also accepts the operator
//! symbol (`"<"`, `"not in"`, `"exception match"`, ...).

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::op::CompareOp;
use crate::util::fast_map::fast_hash_map_new;

use super::builder::{CodeBuilder, Label};
use super::code::{CodeUnit, Constant};
use super::opcode::{Opcode, OperandClass};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsmUnit {
    pub name: String,
    #[serde(default)]
    pub argcount: usize,
    #[serde(default)]
    pub varnames: Vec<String>,
    #[serde(default)]
    pub freevars: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub consts: Vec<AsmConst>,
    pub code: Vec<AsmInstr>,
}

/// Constant literal. Arrays are tuples, objects are nested code units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AsmConst {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<AsmConst>),
    Code(Box<AsmUnit>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AsmInstr {
    Label { label: String },
    Jump { op: String, target: String },
    Op {
        op: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<AsmArg>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AsmArg {
    Index(u64),
    Name(String),
}

pub fn assemble_json(text: &str) -> Result<CodeUnit> {
    let unit: AsmUnit = serde_json::from_str(text).context("invalid assembly JSON")?;
    assemble(&unit)
}

/// Build and validate a [`CodeUnit`] from its assembly form.
pub fn assemble(unit: &AsmUnit) -> Result<CodeUnit> {
    let consts = unit
        .consts
        .iter()
        .map(to_constant)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("constants of '{}'", unit.name))?;
    let params: Vec<&str> = unit.varnames.iter().map(String::as_str).collect();
    if unit.argcount > params.len() {
        bail!(
            "'{}': argcount {} exceeds {} varnames",
            unit.name,
            unit.argcount,
            params.len()
        );
    }

    let mut b = CodeBuilder::new(unit.name.as_str())
        .with_params(&params[..unit.argcount])
        .with_consts(consts);
    for v in &params[unit.argcount..] {
        b.varname_index(v);
    }
    for n in &unit.names {
        b.name_index(n);
    }
    for f in &unit.freevars {
        b.freevar_index(f);
    }

    let mut labels = fast_hash_map_new::<&str, Label>();
    for (pos, instr) in unit.code.iter().enumerate() {
        let ctx = || format!("'{}' instruction #{pos}", unit.name);
        match instr {
            AsmInstr::Label { label } => {
                let l = *labels.entry(label.as_str()).or_insert_with(|| b.new_label());
                b.bind(l);
            }
            AsmInstr::Jump { op, target } => {
                let opcode = opcode(op).with_context(ctx)?;
                if !opcode.class().is_jump() {
                    return Err(anyhow!("{opcode} does not take a jump target")).with_context(ctx);
                }
                let l = *labels.entry(target.as_str()).or_insert_with(|| b.new_label());
                b.emit_jump(opcode, l);
            }
            AsmInstr::Op { op, arg } => {
                let opcode = opcode(op).with_context(ctx)?;
                emit_op(&mut b, opcode, arg.as_ref()).with_context(ctx)?;
            }
        }
    }
    b.finish()
}

fn opcode(mnemonic: &str) -> Result<Opcode> {
    Opcode::from_mnemonic(mnemonic).ok_or_else(|| anyhow!("unknown opcode '{mnemonic}'"))
}

fn emit_op(b: &mut CodeBuilder, op: Opcode, arg: Option<&AsmArg>) -> Result<()> {
    match (op.class(), arg) {
        (OperandClass::None, None) => {
            b.emit(op);
        }
        (OperandClass::None, Some(_)) => bail!("{op} takes no operand"),
        (class, _) if class.is_jump() => bail!("{op} needs a \"target\" label"),
        (_, None) => bail!("{op} needs an \"arg\""),
        (_, Some(AsmArg::Index(i))) => {
            let i = usize::try_from(*i).context("operand does not fit in usize")?;
            b.emit_arg(op, i);
        }
        (_, Some(AsmArg::Name(name))) => {
            let idx = match op {
                Opcode::LoadName
                | Opcode::StoreName
                | Opcode::DeleteName
                | Opcode::LoadGlobal
                | Opcode::StoreGlobal => b.name_index(name),
                Opcode::LoadFast | Opcode::StoreFast => b.varname_index(name),
                Opcode::LoadDeref => b.freevar_index(name),
                Opcode::CompareOp => compare_op(name)? as usize,
                _ => bail!("{op} does not take a symbolic operand ('{name}')"),
            };
            b.emit_arg(op, idx);
        }
    }
    Ok(())
}

fn compare_op(symbol: &str) -> Result<CompareOp> {
    (0..=u8::MAX)
        .map_while(CompareOp::from_u8)
        .find(|op| op.symbol() == symbol)
        .ok_or_else(|| anyhow!("unknown comparison '{symbol}'"))
}

fn to_constant(c: &AsmConst) -> Result<Constant> {
    Ok(match c {
        AsmConst::None => Constant::None,
        AsmConst::Bool(b) => Constant::Bool(*b),
        AsmConst::Int(i) => Constant::Int(*i),
        AsmConst::Float(f) => Constant::Float(*f),
        AsmConst::Str(s) => Constant::Str(Arc::from(s.as_str())),
        AsmConst::Tuple(items) => Constant::Tuple(items.iter().map(to_constant).collect::<Result<_>>()?),
        AsmConst::Code(unit) => Constant::Code(Arc::new(assemble(unit)?)),
    })
}
