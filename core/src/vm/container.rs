//! `SVMB` binary container for code units.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "SVMB" | version u16 | reserved u16 | unit
//! unit   = name:str | argcount:u32 | names:[str] | varnames:[str]
//!        | freevars:[str] | consts:[const] | code:bytes
//! str    = len:u32 utf8
//! [T]    = count:u32 T*
//! const  = tag:u8 payload
//! ```
//!
//! Constant tags: 0 None, 1 False, 2 True, 3 Int(i64), 4 Float(f64),
//! 5 Str, 6 Tuple([const]), 7 Code(unit).

use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};

use super::code::{CodeUnit, Constant};

pub const MAGIC: [u8; 4] = *b"SVMB";
pub const CURRENT_VERSION: u16 = 1;

/// Nesting limit for tuples and code constants while decoding.
const MAX_NESTING: usize = 64;

mod tag {
    pub const NONE: u8 = 0;
    pub const FALSE: u8 = 1;
    pub const TRUE: u8 = 2;
    pub const INT: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const STR: u8 = 5;
    pub const TUPLE: u8 = 6;
    pub const CODE: u8 = 7;
}

/// Serialize `unit` (and every nested unit) into an `SVMB` image.
pub fn encode_unit(unit: &CodeUnit) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64 + unit.code.len());
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, CURRENT_VERSION);
    write_u16(&mut out, 0); // reserved
    write_unit(&mut out, unit)?;
    tracing::debug!(target: "stackvm::container", unit = %unit.name, bytes = out.len(), "encoded");
    Ok(out)
}

/// Parse an `SVMB` image. The result is validated before it is returned.
pub fn decode_unit(bytes: &[u8]) -> Result<CodeUnit> {
    ensure!(bytes.len() >= 8, "image too small ({} bytes)", bytes.len());
    ensure!(bytes[..4] == MAGIC, "invalid SVMB magic");

    let mut cursor = 4;
    let version = read_u16(bytes, &mut cursor)?;
    let _reserved = read_u16(bytes, &mut cursor)?;
    ensure!(
        version == CURRENT_VERSION,
        "unsupported SVMB version {} (reader supports {})",
        version,
        CURRENT_VERSION
    );

    let unit = read_unit(bytes, &mut cursor, 0)?;
    ensure!(
        cursor == bytes.len(),
        "{} trailing bytes after code unit",
        bytes.len() - cursor
    );
    unit.validate().context("decoded unit failed validation")?;
    tracing::debug!(target: "stackvm::container", unit = %unit.name, version, "decoded");
    Ok(unit)
}

fn write_unit(out: &mut Vec<u8>, unit: &CodeUnit) -> Result<()> {
    write_str(out, &unit.name)?;
    write_len(out, unit.argcount)?;
    for table in [&unit.names, &unit.varnames, &unit.freevars] {
        write_len(out, table.len())?;
        for name in table {
            write_str(out, name)?;
        }
    }
    write_len(out, unit.consts.len())?;
    for constant in &unit.consts {
        write_constant(out, constant)?;
    }
    write_len(out, unit.code.len())?;
    out.extend_from_slice(&unit.code);
    Ok(())
}

fn write_constant(out: &mut Vec<u8>, constant: &Constant) -> Result<()> {
    match constant {
        Constant::None => out.push(tag::NONE),
        Constant::Bool(false) => out.push(tag::FALSE),
        Constant::Bool(true) => out.push(tag::TRUE),
        Constant::Int(i) => {
            out.push(tag::INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Constant::Float(f) => {
            out.push(tag::FLOAT);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Constant::Str(s) => {
            out.push(tag::STR);
            write_str(out, s)?;
        }
        Constant::Tuple(items) => {
            out.push(tag::TUPLE);
            write_len(out, items.len())?;
            for item in items {
                write_constant(out, item)?;
            }
        }
        Constant::Code(unit) => {
            out.push(tag::CODE);
            write_unit(out, unit).with_context(|| format!("nested unit '{}'", unit.name))?;
        }
    }
    Ok(())
}

fn read_unit(bytes: &[u8], cursor: &mut usize, depth: usize) -> Result<CodeUnit> {
    ensure!(depth <= MAX_NESTING, "code units nested deeper than {MAX_NESTING}");
    let name: Arc<str> = read_str(bytes, cursor).context("unit name")?;
    let argcount = read_u32(bytes, cursor)? as usize;
    let names = read_names(bytes, cursor).with_context(|| format!("names of '{name}'"))?;
    let varnames = read_names(bytes, cursor).with_context(|| format!("varnames of '{name}'"))?;
    let freevars = read_names(bytes, cursor).with_context(|| format!("freevars of '{name}'"))?;

    let count = read_count(bytes, cursor)?;
    let mut consts = Vec::with_capacity(count);
    for i in 0..count {
        let c = read_constant(bytes, cursor, depth)
            .with_context(|| format!("constant #{i} of '{name}'"))?;
        consts.push(c);
    }

    let len = read_count(bytes, cursor)?;
    let code = take(bytes, cursor, len)
        .with_context(|| format!("code of '{name}'"))?
        .to_vec();

    Ok(CodeUnit {
        name,
        argcount,
        code,
        consts,
        names,
        varnames,
        freevars,
    })
}

fn read_constant(bytes: &[u8], cursor: &mut usize, depth: usize) -> Result<Constant> {
    ensure!(depth <= MAX_NESTING, "constants nested deeper than {MAX_NESTING}");
    let tag = take(bytes, cursor, 1)?[0];
    Ok(match tag {
        tag::NONE => Constant::None,
        tag::FALSE => Constant::Bool(false),
        tag::TRUE => Constant::Bool(true),
        tag::INT => Constant::Int(i64::from_le_bytes(take_array(bytes, cursor)?)),
        tag::FLOAT => Constant::Float(f64::from_le_bytes(take_array(bytes, cursor)?)),
        tag::STR => Constant::Str(read_str(bytes, cursor)?),
        tag::TUPLE => {
            let count = read_count(bytes, cursor)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_constant(bytes, cursor, depth + 1)?);
            }
            Constant::Tuple(items)
        }
        tag::CODE => Constant::Code(Arc::new(read_unit(bytes, cursor, depth + 1)?)),
        other => bail!("unknown constant tag {other} at offset {}", *cursor - 1),
    })
}

fn read_names(bytes: &[u8], cursor: &mut usize) -> Result<Vec<Arc<str>>> {
    let count = read_count(bytes, cursor)?;
    (0..count).map(|_| read_str(bytes, cursor)).collect()
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).context("length does not fit in u32")?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn write_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    write_len(out, value.len())?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = cursor
        .checked_add(n)
        .filter(|end| *end <= bytes.len())
        .with_context(|| format!("unexpected end of input reading {n} bytes at offset {cursor}"))?;
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn take_array<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(take(bytes, cursor, N)?);
    Ok(buf)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    take_array(bytes, cursor).map(u16::from_le_bytes)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    take_array(bytes, cursor).map(u32::from_le_bytes)
}

/// A count is bounded by the remaining input, so a corrupt header cannot
/// trigger a huge allocation.
fn read_count(bytes: &[u8], cursor: &mut usize) -> Result<usize> {
    let count = read_u32(bytes, cursor)? as usize;
    ensure!(
        count <= bytes.len() - *cursor,
        "count {count} exceeds the {} remaining bytes",
        bytes.len() - *cursor
    );
    Ok(count)
}

fn read_str(bytes: &[u8], cursor: &mut usize) -> Result<Arc<str>> {
    let len = read_count(bytes, cursor)?;
    let raw = take(bytes, cursor, len)?;
    let s = std::str::from_utf8(raw).context("string is not valid UTF-8")?;
    Ok(Arc::from(s))
}
