use super::error::Fault;
use super::opcode::{Instruction, Opcode, Operand, OperandClass};

/// Decode the instruction starting at `offset`.
///
/// Returns `Ok(None)` at end of stream. Relative jumps come back resolved to
/// absolute targets (`next + delta`).
#[inline]
pub fn decode_at(code: &[u8], offset: usize) -> Result<Option<Instruction>, Fault> {
    let Some(&byte) = code.get(offset) else {
        return Ok(None);
    };
    let opcode = Opcode::from_byte(byte).ok_or(Fault::UnsupportedOpcode(byte))?;
    let next = offset + opcode.size();
    if next > code.len() {
        return Err(Fault::MalformedCode(format!(
            "truncated operand for {opcode} at offset {offset}"
        )));
    }
    let operand = match opcode.class() {
        OperandClass::None => Operand::None,
        OperandClass::Byte => Operand::Index(code[offset + 1] as u16),
        OperandClass::Wide => Operand::Index(read_u16(code, offset + 1)),
        OperandClass::Absolute => Operand::Target(read_u16(code, offset + 1) as usize),
        OperandClass::Relative => Operand::Target(next + read_u16(code, offset + 1) as usize),
    };
    Ok(Some(Instruction {
        offset,
        opcode,
        operand,
        next,
    }))
}

#[inline]
fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([code[at], code[at + 1]])
}

/// Linear walk over a whole instruction stream, stopping after the first error.
pub struct Decoder<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Instruction, Fault>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match decode_at(self.code, self.offset) {
            Ok(Some(instr)) => {
                self.offset = instr.next;
                Some(Ok(instr))
            }
            Ok(None) => None,
            Err(fault) => {
                self.failed = true;
                Some(Err(fault))
            }
        }
    }
}
