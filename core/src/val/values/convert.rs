use std::sync::Arc;

use crate::vm::Constant;

use super::Val;

impl From<&Constant> for Val {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::None => Val::None,
            Constant::Bool(b) => Val::Bool(*b),
            Constant::Int(i) => Val::Int(*i),
            Constant::Float(f) => Val::Float(*f),
            Constant::Str(s) => Val::Str(s.clone()),
            Constant::Tuple(items) => Val::Tuple(items.iter().map(Val::from).collect()),
            Constant::Code(code) => Val::Code(code.clone()),
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<Vec<Val>> for Val {
    fn from(items: Vec<Val>) -> Self {
        Val::List(items.into())
    }
}

impl<T: Into<Val>> From<Option<T>> for Val {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Val::None, Into::into)
    }
}
