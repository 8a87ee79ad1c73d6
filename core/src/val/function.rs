use std::fmt;
use std::sync::Arc;

use crate::util::fast_map::FastHashMap;
use crate::vm::{CodeUnit, VmContext};

use super::Val;

/// Host function callable from guest code.
///
/// Returning an [`Exception`](super::Exception) inside the `anyhow::Error`
/// raises that exception; any other error surfaces as `RuntimeError`.
pub type NativeFn = fn(&[Val], &mut VmContext) -> anyhow::Result<Val>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeFunction {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// Bindings visible to a function body through `LOAD_NAME` / `LOAD_DEREF`,
/// captured when the function object was made.
#[derive(Debug, Default)]
pub struct Scope {
    pub bindings: FastHashMap<Arc<str>, Val>,
    pub parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn lookup(&self, name: &str) -> Option<&Val> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(v) = s.bindings.get(name) {
                return Some(v);
            }
            scope = s.parent.as_deref();
        }
        None
    }
}

/// A guest function: a code unit plus the scope it closed over.
#[derive(Debug)]
pub struct FunctionValue {
    pub name: Arc<str>,
    pub code: Arc<CodeUnit>,
    pub enclosing: Option<Arc<Scope>>,
}
