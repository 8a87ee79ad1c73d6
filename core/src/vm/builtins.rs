//! Core natives installed by [`VmContext::new`].

use anyhow::Result;

use crate::val::{ExcType, Exception, RangeValue, Val};

use super::context::VmContext;

pub(crate) fn install_core_builtins(ctx: &mut VmContext) {
    ctx.define_builtin("range", range);
    ctx.define_builtin("len", len);
    ctx.define_builtin("abs", abs);
    ctx.define_builtin("str", to_str);
    ctx.define_builtin("int", to_int);
    ctx.define_builtin("float", to_float);
    ctx.define_builtin("bool", to_bool);
    ctx.define_builtin("list", to_list);
    ctx.define_builtin("tuple", to_tuple);
    ctx.define_builtin("print", print);
    for exc in ExcType::ALL {
        ctx.set_builtin(exc.name(), Val::ExcType(exc));
    }
}

/// Reject calls outside `min..=max` arguments with a guest `TypeError`.
pub fn check_arity(name: &str, args: &[Val], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else if args.len() < min {
        format!("at least {min}")
    } else {
        format!("at most {max}")
    };
    Err(Exception::type_error(format!(
        "{name}() takes {expected} argument{} ({} given)",
        if min == max && min == 1 { "" } else { "s" },
        args.len()
    ))
    .into())
}

fn int_arg(name: &str, val: &Val) -> Result<i64> {
    match val {
        Val::Int(i) => Ok(*i),
        Val::Bool(b) => Ok(*b as i64),
        other => Err(Exception::type_error(format!(
            "{name}() expects an integer, got '{}'",
            other.type_name()
        ))
        .into()),
    }
}

fn range(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("range", args, 1, 3)?;
    let (start, stop) = match args {
        [stop] => (0, int_arg("range", stop)?),
        _ => (int_arg("range", &args[0])?, int_arg("range", &args[1])?),
    };
    let step = args.get(2).map(|v| int_arg("range", v)).transpose()?.unwrap_or(1);
    if step == 0 {
        return Err(Exception::value_error("range() arg 3 must not be zero").into());
    }
    Ok(Val::Range(RangeValue::new(start, stop, step)))
}

fn len(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("len", args, 1, 1)?;
    let n = match &args[0] {
        Val::Str(s) => s.chars().count(),
        Val::List(items) | Val::Tuple(items) => items.len(),
        Val::Range(r) => r.len(),
        other => {
            return Err(Exception::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))
            .into());
        }
    };
    Ok(Val::Int(n as i64))
}

fn abs(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("abs", args, 1, 1)?;
    match &args[0] {
        Val::Float(f) => Ok(Val::Float(f.abs())),
        Val::Int(i) => Ok(Val::Int(i.checked_abs().ok_or_else(Exception::overflow)?)),
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        other => Err(Exception::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))
        .into()),
    }
}

fn to_str(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("str", args, 0, 1)?;
    Ok(match args.first() {
        Some(Val::Str(s)) => Val::Str(s.clone()),
        Some(v) => Val::from(v.to_string()),
        None => Val::str(""),
    })
}

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn to_int(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("int", args, 0, 1)?;
    let Some(arg) = args.first() else {
        return Ok(Val::Int(0));
    };
    match arg {
        Val::Int(i) => Ok(Val::Int(*i)),
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        Val::Float(f) if f.is_nan() => {
            Err(Exception::value_error("cannot convert float NaN to integer").into())
        }
        Val::Float(f) if f.is_infinite() => {
            Err(Exception::new(ExcType::OverflowError, "cannot convert float infinity to integer").into())
        }
        // 2^63 is exactly representable; anything at or past it does not fit.
        Val::Float(f) if f.trunc() >= I64_BOUND || f.trunc() < -I64_BOUND => {
            Err(Exception::new(ExcType::OverflowError, "int too large to convert").into())
        }
        Val::Float(f) => Ok(Val::Int(f.trunc() as i64)),
        Val::Str(s) => s.trim().parse::<i64>().map(Val::Int).map_err(|_| {
            Exception::value_error(format!("invalid literal for int() with base 10: {}", arg.repr())).into()
        }),
        other => Err(Exception::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))
        .into()),
    }
}

fn to_float(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("float", args, 0, 1)?;
    let Some(arg) = args.first() else {
        return Ok(Val::Float(0.0));
    };
    match arg {
        Val::Float(f) => Ok(Val::Float(*f)),
        Val::Int(i) => Ok(Val::Float(*i as f64)),
        Val::Bool(b) => Ok(Val::Float(*b as i64 as f64)),
        Val::Str(s) => s.trim().parse::<f64>().map(Val::Float).map_err(|_| {
            Exception::value_error(format!("could not convert string to float: {}", arg.repr())).into()
        }),
        other => Err(Exception::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))
        .into()),
    }
}

fn to_bool(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("bool", args, 0, 1)?;
    Ok(Val::Bool(args.first().is_some_and(Val::is_truthy)))
}

fn to_list(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("list", args, 0, 1)?;
    let items = match args.first() {
        Some(v) => v.collect_items()?,
        None => Vec::new(),
    };
    Ok(Val::list(items))
}

fn to_tuple(args: &[Val], _ctx: &mut VmContext) -> Result<Val> {
    check_arity("tuple", args, 0, 1)?;
    let items = match args.first() {
        Some(Val::Tuple(items)) => return Ok(Val::Tuple(items.clone())),
        Some(v) => v.collect_items()?,
        None => Vec::new(),
    };
    Ok(Val::tuple(items))
}

fn print(args: &[Val], ctx: &mut VmContext) -> Result<Val> {
    let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
    ctx.write_line(line);
    Ok(Val::None)
}
