use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Rem, Sub};
use std::sync::Arc;

use crate::val::{ExcType, Exception};

use super::Val;

type OpResult = Result<Val, Exception>;

pub(crate) fn unsupported(l: &Val, op: &str, r: &Val) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        l.type_name(),
        r.type_name()
    ))
}

fn int_op(a: i64, b: i64, f: fn(i64, i64) -> Option<i64>) -> OpResult {
    f(a, b).map(Val::Int).ok_or_else(Exception::overflow)
}

fn concat(a: &[Val], b: &[Val]) -> Arc<[Val]> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.into()
}

/// Largest result, in bytes, that `*` may build from a sequence or string.
pub(crate) const MAX_REPEAT_BYTES: usize = u32::MAX as usize;

// Checked before allocating: an oversized count must not reach the allocator.
fn repeat_len(unit: usize, len: usize, count: usize, what: &str) -> Result<usize, Exception> {
    len.checked_mul(count)
        .filter(|total| total.checked_mul(unit).is_some_and(|bytes| bytes <= MAX_REPEAT_BYTES))
        .ok_or_else(|| Exception::new(ExcType::OverflowError, format!("repeated {what} is too long")))
}

fn repeat_seq(items: &[Val], count: i64) -> Result<Arc<[Val]>, Exception> {
    let count = count.max(0) as usize;
    let total = repeat_len(std::mem::size_of::<Val>(), items.len(), count, "sequence")?;
    let mut out = Vec::with_capacity(total);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out.into())
}

fn repeat_str(s: &str, count: i64) -> OpResult {
    let count = count.max(0) as usize;
    repeat_len(1, s.len(), count, "string")?;
    Ok(Val::str(s.repeat(count)))
}

impl Add for &Val {
    type Output = OpResult;

    fn add(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => {
                if a.is_empty() {
                    return Ok(Val::Str(b.clone()));
                }
                if b.is_empty() {
                    return Ok(Val::Str(a.clone()));
                }
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Val::from(s))
            }
            (Val::List(a), Val::List(b)) => Ok(Val::List(concat(a, b))),
            (Val::Tuple(a), Val::Tuple(b)) => Ok(Val::Tuple(concat(a, b))),
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Val::Float(a + b)),
                _ => Err(unsupported(self, "+", other)),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => int_op(a, b, i64::checked_add),
                _ => Err(unsupported(self, "+", other)),
            },
        }
    }
}

impl Sub for &Val {
    type Output = OpResult;

    fn sub(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Val::Float(a - b)),
                _ => Err(unsupported(self, "-", other)),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => int_op(a, b, i64::checked_sub),
                _ => Err(unsupported(self, "-", other)),
            },
        }
    }
}

impl Mul for &Val {
    type Output = OpResult;

    fn mul(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Str(s), n) | (n, Val::Str(s)) if n.as_int().is_some() => {
                repeat_str(s, n.as_int().unwrap_or(0))
            }
            (Val::List(items), n) | (n, Val::List(items)) if n.as_int().is_some() => {
                Ok(Val::List(repeat_seq(items, n.as_int().unwrap_or(0))?))
            }
            (Val::Tuple(items), n) | (n, Val::Tuple(items)) if n.as_int().is_some() => {
                Ok(Val::Tuple(repeat_seq(items, n.as_int().unwrap_or(0))?))
            }
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Val::Float(a * b)),
                _ => Err(unsupported(self, "*", other)),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => int_op(a, b, i64::checked_mul),
                _ => Err(unsupported(self, "*", other)),
            },
        }
    }
}

/// True division: always produces a float.
impl Div for &Val {
    type Output = OpResult;

    fn div(self, other: Self) -> Self::Output {
        match (self.as_f64(), other.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(Exception::zero_division("division by zero")),
            (Some(a), Some(b)) => Ok(Val::Float(a / b)),
            _ => Err(unsupported(self, "/", other)),
        }
    }
}

/// Modulo with the sign of the divisor.
impl Rem for &Val {
    type Output = OpResult;

    fn rem(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Err(Exception::zero_division("float modulo")),
                (Some(a), Some(b)) => {
                    let mut r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        r += b;
                    }
                    Ok(Val::Float(r))
                }
                _ => Err(unsupported(self, "%", other)),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(_), Some(0)) => Err(Exception::zero_division("integer division or modulo by zero")),
                // i64::MIN % -1 overflows in Rust but is exactly 0.
                (Some(_), Some(-1)) => Ok(Val::Int(0)),
                (Some(a), Some(b)) => {
                    let mut r = a % b;
                    if r != 0 && (r < 0) != (b < 0) {
                        r += b;
                    }
                    Ok(Val::Int(r))
                }
                _ => Err(unsupported(self, "%", other)),
            },
        }
    }
}

impl Val {
    /// `a // b`, rounding toward negative infinity.
    pub fn floor_div(&self, other: &Val) -> OpResult {
        match (self, other) {
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Err(Exception::zero_division("float floor division by zero")),
                (Some(a), Some(b)) => Ok(Val::Float((a / b).floor())),
                _ => Err(unsupported(self, "//", other)),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(_), Some(0)) => Err(Exception::zero_division("integer division or modulo by zero")),
                (Some(a), Some(b)) => {
                    let q = a.checked_div(b).ok_or_else(Exception::overflow)?;
                    if a % b != 0 && ((a < 0) != (b < 0)) {
                        Ok(Val::Int(q - 1))
                    } else {
                        Ok(Val::Int(q))
                    }
                }
                _ => Err(unsupported(self, "//", other)),
            },
        }
    }

    pub fn negate(&self) -> OpResult {
        match self {
            Val::Float(f) => Ok(Val::Float(-f)),
            other => match other.as_int() {
                Some(i) => i.checked_neg().map(Val::Int).ok_or_else(Exception::overflow),
                None => Err(Exception::type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    /// `self[index]` for sequences; negative indices count from the end.
    pub fn subscript(&self, index: &Val) -> OpResult {
        if !matches!(self, Val::List(_) | Val::Tuple(_) | Val::Str(_) | Val::Range(_)) {
            return Err(Exception::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            )));
        }
        let Some(raw) = index.as_int() else {
            return Err(Exception::type_error(format!(
                "{} indices must be integers, not {}",
                self.type_name(),
                index.type_name()
            )));
        };
        let out_of_range = || Exception::index_error(format!("{} index out of range", self.type_name()));
        match self {
            Val::List(items) | Val::Tuple(items) => normalize_index(raw, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(out_of_range),
            Val::Str(s) => normalize_index(raw, s.chars().count())
                .and_then(|i| s.chars().nth(i))
                .map(|c| Val::from(c.to_string()))
                .ok_or_else(out_of_range),
            Val::Range(r) => normalize_index(raw, r.len())
                .and_then(|i| r.get(i))
                .map(Val::Int)
                .ok_or_else(out_of_range),
            _ => Err(out_of_range()),
        }
    }

    /// `item in self`.
    pub fn contains(&self, item: &Val) -> Result<bool, Exception> {
        match self {
            Val::List(items) | Val::Tuple(items) => Ok(items.iter().any(|v| v == item)),
            Val::Str(s) => match item {
                Val::Str(needle) => Ok(s.contains(needle.as_ref())),
                other => Err(Exception::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Val::Range(r) => Ok(item.as_int().is_some_and(|i| r.contains(i))
                || matches!(item, Val::Float(f) if f.fract() == 0.0 && r.contains(*f as i64))),
            other => Err(Exception::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`. Numbers, strings and same-kind
    /// sequences (lexicographic) are ordered; anything else is a `TypeError`.
    /// `Ok(None)` means unordered (a NaN operand), which makes every
    /// ordering comparison false.
    pub fn compare(&self, other: &Val, op: &str) -> Result<Option<Ordering>, Exception> {
        let unordered = || {
            Exception::type_error(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))
        };
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => Ok(Some(a.cmp(b))),
            (Val::List(a), Val::List(b)) | (Val::Tuple(a), Val::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if x != y {
                        return x.compare(y, op);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => Err(unordered()),
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => Ok(Some(a.cmp(&b))),
                _ => Err(unordered()),
            },
        }
    }
}

fn normalize_index(raw: i64, len: usize) -> Option<usize> {
    let resolved = if raw < 0 { raw.checked_add(len as i64)? } else { raw };
    usize::try_from(resolved).ok().filter(|&i| i < len)
}
