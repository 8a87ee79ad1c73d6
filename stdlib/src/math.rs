use anyhow::Result;
use stackvm_core::val::{ExcType, Exception, Val};
use stackvm_core::vm::{VmContext, check_arity};
use std::cmp::Ordering;

use crate::Entry;

pub(crate) const FUNCTIONS: &[Entry] = &[
    ("min", min),
    ("max", max),
    ("sqrt", sqrt),
    ("floor", floor),
    ("ceil", ceil),
    ("pow", pow),
];

fn number(name: &str, val: &Val) -> Result<f64> {
    match val {
        Val::Int(i) => Ok(*i as f64),
        Val::Float(f) => Ok(*f),
        Val::Bool(b) => Ok(*b as i64 as f64),
        other => Err(Exception::type_error(format!(
            "{name}() argument must be a number, not '{}'",
            other.type_name()
        ))
        .into()),
    }
}

/// `min(a, b, ...)` or `min(iterable)`.
pub(crate) fn min(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    extreme("min", args, Ordering::Less)
}

/// `max(a, b, ...)` or `max(iterable)`.
pub(crate) fn max(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    extreme("max", args, Ordering::Greater)
}

// Ties keep the first candidate.
fn extreme(name: &str, args: &[Val], wanted: Ordering) -> Result<Val> {
    check_arity(name, args, 1, usize::MAX)?;
    let items = match args {
        [single] => single.collect_items()?,
        _ => args.to_vec(),
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(Exception::value_error(format!("{name}() arg is an empty sequence")).into());
    };
    let symbol = if wanted == Ordering::Less { "<" } else { ">" };
    for candidate in iter {
        if candidate.compare(&best, symbol)? == Some(wanted) {
            best = candidate;
        }
    }
    Ok(best)
}

pub(crate) fn sqrt(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("sqrt", args, 1, 1)?;
    let x = number("sqrt", &args[0])?;
    if x < 0.0 {
        return Err(Exception::value_error("math domain error").into());
    }
    Ok(Val::Float(x.sqrt()))
}

pub(crate) fn floor(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("floor", args, 1, 1)?;
    to_integral("floor", &args[0], f64::floor)
}

pub(crate) fn ceil(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("ceil", args, 1, 1)?;
    to_integral("ceil", &args[0], f64::ceil)
}

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn to_integral(name: &str, val: &Val, round: fn(f64) -> f64) -> Result<Val> {
    if let Val::Int(i) = val {
        return Ok(Val::Int(*i));
    }
    let x = round(number(name, val)?);
    if x.is_nan() {
        return Err(Exception::value_error("cannot convert float NaN to integer").into());
    }
    if !(-I64_BOUND..I64_BOUND).contains(&x) {
        return Err(Exception::new(ExcType::OverflowError, "cannot convert float to integer").into());
    }
    Ok(Val::Int(x as i64))
}

/// Integer power stays integral for a non-negative exponent; anything else is float.
pub(crate) fn pow(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("pow", args, 2, 2)?;
    if let (Val::Int(base), Val::Int(exp)) = (&args[0], &args[1])
        && *exp >= 0
    {
        let exp = u32::try_from(*exp).map_err(|_| Exception::overflow())?;
        return base
            .checked_pow(exp)
            .map(Val::Int)
            .ok_or_else(|| Exception::overflow().into());
    }
    let base = number("pow", &args[0])?;
    let exp = number("pow", &args[1])?;
    if base == 0.0 && exp < 0.0 {
        return Err(Exception::zero_division("0.0 cannot be raised to a negative power").into());
    }
    Ok(Val::Float(base.powf(exp)))
}
