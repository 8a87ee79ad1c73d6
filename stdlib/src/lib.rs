pub mod math;
pub mod string;


use stackvm_core::{val::NativeFn, vm::VmContext};

/// Install every stdlib native into `ctx` as a builtin.
///
/// Builtins sit behind globals in name lookup, so a guest can still shadow
/// any of these with its own binding.
pub fn register_stdlib(ctx: &mut VmContext) {
    let mut count = 0usize;
    for (name, func) in math::FUNCTIONS.iter().chain(string::FUNCTIONS) {
        ctx.define_builtin(*name, *func);
        count += 1;
    }
    tracing::debug!(target: "stackvm::stdlib", count, "registered stdlib natives");
}

/// Names registered by [`register_stdlib`].
pub fn stdlib_names() -> impl Iterator<Item = &'static str> {
    math::FUNCTIONS
        .iter()
        .chain(string::FUNCTIONS)
        .map(|(name, _)| *name)
}

pub(crate) type Entry = (&'static str, NativeFn);
