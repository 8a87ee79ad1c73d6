use std::cmp::Ordering;
use std::fmt::{self, Display};

use crate::val::{Exception, Val};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub(crate) fn eval_val(self, val: &Val) -> Result<Val, Exception> {
        match self {
            UnaryOp::Neg => val.negate(),
            UnaryOp::Not => Ok(Val::Bool(!val.is_truthy())),
        }
    }
}

/// Binary operators behind `BINARY_*` and `INPLACE_*`.
///
/// Values are immutable, so the in-place forms evaluate exactly like the plain ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Subscr,
}

impl BinOp {
    pub(crate) fn eval_vals(self, l: &Val, r: &Val) -> Result<Val, Exception> {
        match self {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::TrueDiv => l / r,
            BinOp::FloorDiv => l.floor_div(r),
            BinOp::Mod => l % r,
            BinOp::Subscr => l.subscript(r),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::TrueDiv => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Subscr => "[]",
        })
    }
}

/// `COMPARE_OP` argument, in operand-byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
    Is = 8,
    IsNot = 9,
    ExcMatch = 10,
}

impl CompareOp {
    pub fn from_u8(arg: u8) -> Option<Self> {
        Some(match arg {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ne,
            4 => CompareOp::Gt,
            5 => CompareOp::Ge,
            6 => CompareOp::In,
            7 => CompareOp::NotIn,
            8 => CompareOp::Is,
            9 => CompareOp::IsNot,
            10 => CompareOp::ExcMatch,
            _ => return None,
        })
    }

    pub(crate) fn eval_vals(self, l: &Val, r: &Val) -> Result<bool, Exception> {
        match self {
            CompareOp::Eq => Ok(l == r),
            CompareOp::Ne => Ok(l != r),
            CompareOp::In => r.contains(l),
            CompareOp::NotIn => r.contains(l).map(|found| !found),
            CompareOp::Is => Ok(l.is_same(r)),
            CompareOp::IsNot => Ok(!l.is_same(r)),
            CompareOp::ExcMatch => exception_matches(l, r),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                let Some(ord) = l.compare(r, self.symbol())? else {
                    return Ok(false);
                };
                Ok(match self {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                })
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExcMatch => "exception match",
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Does the raised `value` (a type or an instance) match the handler `pattern`
/// (a type or a tuple of types)? Subclasses match their ancestors.
pub(crate) fn exception_matches(value: &Val, pattern: &Val) -> Result<bool, Exception> {
    let raised = match value {
        Val::ExcType(t) => *t,
        Val::Exception(e) => e.kind,
        _ => return Ok(false),
    };
    match pattern {
        Val::ExcType(t) => Ok(raised.is_subclass_of(*t)),
        Val::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(value, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(Exception::type_error(format!(
            "catching '{}' is not allowed: handlers must name exception types",
            other.type_name()
        ))),
    }
}
