use std::sync::Arc;

use anyhow::Result;
use stackvm_core::val::{Exception, Val};
use stackvm_core::vm::{VmContext, check_arity};

use crate::Entry;

pub(crate) const FUNCTIONS: &[Entry] = &[
    ("upper", upper),
    ("lower", lower),
    ("strip", strip),
    ("join", join),
    ("split", split),
];

fn str_arg<'a>(name: &str, position: usize, val: &'a Val) -> Result<&'a Arc<str>> {
    match val {
        Val::Str(s) => Ok(s),
        other => Err(Exception::type_error(format!(
            "{name}() argument {position} must be str, not '{}'",
            other.type_name()
        ))
        .into()),
    }
}

pub(crate) fn upper(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("upper", args, 1, 1)?;
    Ok(Val::from(str_arg("upper", 1, &args[0])?.to_uppercase()))
}

pub(crate) fn lower(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("lower", args, 1, 1)?;
    Ok(Val::from(str_arg("lower", 1, &args[0])?.to_lowercase()))
}

/// `strip(s)` trims whitespace; `strip(s, chars)` trims any of `chars`.
pub(crate) fn strip(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("strip", args, 1, 2)?;
    let s = str_arg("strip", 1, &args[0])?;
    let trimmed = match args.get(1) {
        None | Some(Val::None) => s.trim(),
        Some(chars) => {
            let chars = str_arg("strip", 2, chars)?;
            s.trim_matches(|c: char| chars.contains(c))
        }
    };
    if trimmed.len() == s.len() {
        return Ok(Val::Str(s.clone()));
    }
    Ok(Val::str(trimmed))
}

/// `join(sep, iterable)`: every item must already be a string.
pub(crate) fn join(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("join", args, 2, 2)?;
    let sep = str_arg("join", 1, &args[0])?;
    let items = args[1].collect_items()?;
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let Val::Str(part) = item else {
            return Err(Exception::type_error(format!(
                "sequence item {i}: expected str instance, {} found",
                item.type_name()
            ))
            .into());
        };
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part);
    }
    Ok(Val::from(out))
}

/// `split(s)` splits on runs of whitespace; `split(s, sep)` on each `sep`.
pub(crate) fn split(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("split", args, 1, 2)?;
    let s = str_arg("split", 1, &args[0])?;
    let parts: Vec<Val> = match args.get(1) {
        None | Some(Val::None) => s.split_whitespace().map(Val::str).collect(),
        Some(sep) => {
            let sep = str_arg("split", 2, sep)?;
            if sep.is_empty() {
                return Err(Exception::value_error("empty separator").into());
            }
            s.split(sep.as_ref()).map(Val::str).collect()
        }
    };
    Ok(Val::list(parts))
}
