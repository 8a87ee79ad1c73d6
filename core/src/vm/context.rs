use std::sync::Arc;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{NativeFn, NativeFunction, Val};

use super::builtins::install_core_builtins;

/// VM 运行期全局上下文。
///
/// - 保存模块级全局符号表；
/// - 保存内建函数表（查找顺序在全局之后）；
/// - 可选地捕获 `print` 输出，便于测试。
#[derive(Debug, Clone)]
pub struct VmContext {
    globals: FastHashMap<Arc<str>, Val>,
    builtins: FastHashMap<Arc<str>, Val>,
    // Captured `print` lines; `None` writes to stdout.
    output: Option<Vec<String>>,
}

impl Default for VmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl VmContext {
    /// 创建上下文并安装核心内建函数与异常类型。
    pub fn new() -> Self {
        let mut ctx = Self::empty();
        install_core_builtins(&mut ctx);
        ctx
    }

    /// 创建一个不含任何内建的空上下文。
    pub fn empty() -> Self {
        Self {
            globals: fast_hash_map_new(),
            builtins: fast_hash_map_new(),
            output: None,
        }
    }

    pub fn with_globals<I, K>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = (K, Val)>,
        K: Into<Arc<str>>,
    {
        for (name, value) in globals {
            self.globals.insert(name.into(), value);
        }
        self
    }

    /// Collect `print` output in memory instead of writing to stdout.
    pub fn capture_output(mut self) -> Self {
        self.output = Some(Vec::new());
        self
    }

    pub fn define_builtin(&mut self, name: &'static str, func: NativeFn) {
        self.builtins
            .insert(Arc::from(name), Val::Native(NativeFunction::new(name, func)));
    }

    pub fn set_builtin(&mut self, name: impl Into<Arc<str>>, value: Val) {
        self.builtins.insert(name.into(), value);
    }

    pub fn builtin(&self, name: &str) -> Option<&Val> {
        self.builtins.get(name)
    }

    pub fn set_global(&mut self, name: impl Into<Arc<str>>, value: Val) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&Val> {
        self.globals.get(name)
    }

    pub fn remove_global(&mut self, name: &str) -> Option<Val> {
        self.globals.remove(name)
    }

    /// Global, then builtin.
    #[inline]
    pub fn lookup(&self, name: &str) -> Option<&Val> {
        self.globals.get(name).or_else(|| self.builtins.get(name))
    }

    pub fn globals(&self) -> impl Iterator<Item = (&Arc<str>, &Val)> {
        self.globals.iter()
    }

    pub fn write_line(&mut self, line: String) {
        match &mut self.output {
            Some(buf) => buf.push(line),
            None => println!("{line}"),
        }
    }

    /// Drain captured output; empty when capture is off.
    pub fn take_output(&mut self) -> Vec<String> {
        self.output.as_mut().map(std::mem::take).unwrap_or_default()
    }
}
