mod convert;
mod iter;
mod ops;

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::vm::{CodeUnit, Location};

use super::{ExcType, Exception, FunctionValue, NativeFunction};

pub use iter::{IteratorState, IteratorValue};

/// Marker pushed for a `finally` block entered by a pending `return` or `break`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Return,
    Break,
}

/// Arithmetic progression produced by `range(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    /// `step` must be non-zero; `range()` rejects zero before building one.
    pub fn new(start: i64, stop: i64, step: i64) -> Self {
        Self { start, stop, step }
    }

    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let n = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let v = self.start as i128 + self.step as i128 * index as i128;
        Some(v as i64)
    }

    pub fn contains(&self, value: i64) -> bool {
        let (start, stop, step, v) = (
            self.start as i128,
            self.stop as i128,
            self.step as i128,
            value as i128,
        );
        let in_bounds = if step > 0 {
            start <= v && v < stop
        } else {
            stop < v && v <= start
        };
        in_bounds && (v - start) % step == 0
    }
}

/// Runtime value.
///
/// Containers are immutable and `Arc`-shared, so cloning a value is cheap and
/// `Val` can cross threads.
#[derive(Debug, Clone, Default)]
pub enum Val {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<[Val]>),
    Tuple(Arc<[Val]>),
    Range(RangeValue),
    Iterator(Arc<IteratorValue>),
    Function(Arc<FunctionValue>),
    Native(NativeFunction),
    Code(Arc<CodeUnit>),
    ExcType(ExcType),
    Exception(Arc<Exception>),
    Traceback(Arc<[Location]>),
    Signal(Signal),
}

impl Val {
    pub fn str(s: impl AsRef<str>) -> Self {
        Val::Str(Arc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Val>) -> Self {
        Val::List(items.into())
    }

    pub fn tuple(items: Vec<Val>) -> Self {
        Val::Tuple(items.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::None => "NoneType",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "str",
            Val::List(_) => "list",
            Val::Tuple(_) => "tuple",
            Val::Range(_) => "range",
            Val::Iterator(_) => "iterator",
            Val::Function(_) => "function",
            Val::Native(_) => "builtin_function_or_method",
            Val::Code(_) => "code",
            Val::ExcType(_) => "type",
            Val::Exception(e) => e.kind.name(),
            Val::Traceback(_) => "traceback",
            Val::Signal(_) => "signal",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Val::None => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) | Val::Tuple(items) => !items.is_empty(),
            Val::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by mixed int/float arithmetic. `bool` counts as int.
    #[inline]
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            Val::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    /// Identity test backing `is` / `is not`.
    pub fn is_same(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::None, Val::None) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a.to_bits() == b.to_bits(),
            (Val::Str(a), Val::Str(b)) => Arc::ptr_eq(a, b),
            (Val::List(a), Val::List(b)) | (Val::Tuple(a), Val::Tuple(b)) => Arc::ptr_eq(a, b),
            (Val::Range(a), Val::Range(b)) => a == b,
            (Val::Iterator(a), Val::Iterator(b)) => Arc::ptr_eq(a, b),
            (Val::Function(a), Val::Function(b)) => Arc::ptr_eq(a, b),
            (Val::Native(a), Val::Native(b)) => a.name == b.name,
            (Val::Code(a), Val::Code(b)) => Arc::ptr_eq(a, b),
            (Val::ExcType(a), Val::ExcType(b)) => a == b,
            (Val::Exception(a), Val::Exception(b)) => Arc::ptr_eq(a, b),
            (Val::Traceback(a), Val::Traceback(b)) => Arc::ptr_eq(a, b),
            (Val::Signal(a), Val::Signal(b)) => a == b,
            _ => false,
        }
    }

    /// Turn an iterable into an iterator handle (`GET_ITER`).
    pub fn iter(&self) -> Result<Arc<IteratorValue>, Exception> {
        match self {
            Val::Iterator(it) => Ok(it.clone()),
            Val::List(items) | Val::Tuple(items) => Ok(IteratorValue::new(iter::SeqIter::new(items.clone()))),
            Val::Str(s) => Ok(IteratorValue::new(iter::StrIter::new(s.clone()))),
            Val::Range(r) => Ok(IteratorValue::new(iter::RangeIter::new(*r))),
            other => Err(Exception::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Materialize an iterable into owned items.
    pub fn collect_items(&self) -> Result<Vec<Val>, Exception> {
        match self {
            Val::List(items) | Val::Tuple(items) => Ok(items.to_vec()),
            other => {
                let it = other.iter()?;
                let mut out = Vec::new();
                while let Some(v) = it.next() {
                    out.push(v);
                }
                Ok(out)
            }
        }
    }

    /// Quoted form used for container elements and the CLI result line.
    pub fn repr(&self) -> String {
        match self {
            Val::Str(s) => quote_str(s),
            Val::Exception(e) => match &e.message {
                Some(m) => format!("{}({})", e.kind, quote_str(m)),
                None => format!("{}()", e.kind),
            },
            other => other.to_string(),
        }
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let mut buf = ryu::Buffer::new();
    buf.format_finite(f).to_string()
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Val], open: char, close: char) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&item.repr())?;
    }
    if open == '(' && items.len() == 1 {
        f.write_str(",")?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::None => f.write_str("None"),
            Val::Bool(true) => f.write_str("True"),
            Val::Bool(false) => f.write_str("False"),
            Val::Int(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Val::Float(x) => f.write_str(&format_float(*x)),
            Val::Str(s) => f.write_str(s),
            Val::List(items) => write_seq(f, items, '[', ']'),
            Val::Tuple(items) => write_seq(f, items, '(', ')'),
            Val::Range(r) if r.step == 1 => write!(f, "range({}, {})", r.start, r.stop),
            Val::Range(r) => write!(f, "range({}, {}, {})", r.start, r.stop, r.step),
            Val::Iterator(_) => f.write_str("<iterator>"),
            Val::Function(func) => write!(f, "<function {}>", func.name),
            Val::Native(native) => write!(f, "<built-in function {}>", native.name),
            Val::Code(code) => write!(f, "<code {}>", code.name),
            Val::ExcType(t) => write!(f, "<class '{}'>", t.name()),
            Val::Exception(e) => f.write_str(e.message()),
            Val::Traceback(tb) => write!(f, "<traceback ({} entries)>", tb.len()),
            Val::Signal(Signal::Return) => f.write_str("<signal return>"),
            Val::Signal(Signal::Break) => f.write_str("<signal break>"),
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::None, Val::None) => true,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) | (Val::Tuple(a), Val::Tuple(b)) => a == b,
            (Val::Range(a), Val::Range(b)) => a == b,
            (Val::Float(_), _) | (_, Val::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Val::Bool(_) | Val::Int(_), Val::Bool(_) | Val::Int(_)) => self.as_int() == other.as_int(),
            (Val::ExcType(a), Val::ExcType(b)) => a == b,
            (Val::Signal(a), Val::Signal(b)) => a == b,
            _ => self.is_same(other),
        }
    }
}

/// JSON view of a result: scalars and sequences map directly, everything
/// else serializes as its `repr` string.
impl Serialize for Val {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Val::None => serializer.serialize_none(),
            Val::Bool(b) => serializer.serialize_bool(*b),
            Val::Int(i) => serializer.serialize_i64(*i),
            Val::Float(f) => serializer.serialize_f64(*f),
            Val::Str(s) => serializer.serialize_str(s),
            Val::List(items) | Val::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            other => serializer.serialize_str(&other.repr()),
        }
    }
}
